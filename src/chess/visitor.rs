use pgn_reader::{Outcome, RawTag, Reader, SanPlus, Skip, Visitor};
use std::collections::BTreeMap;
use std::io;
use std::ops::ControlFlow;

/// Tag pairs of one game, keyed by tag name. The first occurrence of a
/// duplicated tag wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap(BTreeMap<String, String>);

impl TagMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert_first(&mut self, key: String, value: String) {
        self.0.entry(key).or_insert(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What the tokenizer saw in the mainline movetext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovetextSummary {
    pub plies: u32,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBlock {
    pub tags: TagMap,
    pub movetext: MovetextSummary,
}

/// Streaming visitor that collects tags and tokenizes the mainline.
///
/// Variations are skipped; comments and NAGs are ignored. Movetext itself is
/// not rebuilt here, the reader keeps the source lines.
#[derive(Default)]
pub struct TagVisitor {
    tags: TagMap,
}

impl TagVisitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Visitor for TagVisitor {
    type Tags = ();
    type Movetext = ParsedBlock;
    type Output = ParsedBlock;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.tags = TagMap::default();
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = value.decode_utf8_lossy().into_owned();
        self.tags.insert_first(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(ParsedBlock {
            tags: std::mem::take(&mut self.tags),
            movetext: MovetextSummary::default(),
        })
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, block: &mut Self::Movetext, _: SanPlus) -> ControlFlow<Self::Output> {
        block.movetext.plies += 1;
        ControlFlow::Continue(())
    }

    fn outcome(&mut self, block: &mut Self::Movetext, outcome: Outcome) -> ControlFlow<Self::Output> {
        block.movetext.outcome = Some(outcome.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, block: Self::Movetext) -> Self::Output {
        block
    }
}

/// Runs one game block through the tokenizer.
///
/// `Ok(None)` means the text held no game at all.
pub fn tokenize_block(block: &str) -> io::Result<Option<ParsedBlock>> {
    let mut reader = Reader::new(io::Cursor::new(block.as_bytes()));
    let mut visitor = TagVisitor::new();
    reader.read_game(&mut visitor)
}
