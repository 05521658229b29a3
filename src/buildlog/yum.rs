// src/buildlog/yum.rs

//! Yum transaction table parser
//!
//! Yum prints the packages of a transaction as a fixed-column table framed
//! by lines of exactly 80 `=` characters:
//!
//! ```text
//! ================================================================================
//!  Package          Arch        Version             Repository             Size
//! ================================================================================
//! Installing:
//!  bash             x86_64      4.2.46-34.el7       base                  1.0 M
//!  tzdata           noarch      2018e-3.el7         updates               481 k
//!
//! Transaction Summary
//! ================================================================================
//! ```
//!
//! Parsing is an explicit state machine. [`transition`] is a pure function of
//! the current state and one line; [`TableParser`] drives it and owns the
//! records of the block being read. A block that fails any structure check is
//! dropped entirely and the failing line is scanned again.

use super::{HandlerResult, LogHandler};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

/// Width of the table frame lines
pub const DELIMITER_WIDTH: usize = 80;

/// Column heading that must follow the opening frame line
pub const EXPECTED_HEADING: [&str; 5] = ["Package", "Arch", "Version", "Repository", "Size"];

/// First line of the table body
const SECTION_MARKER: &str = "Installing:";

/// Body rows have five columns, the size is printed as two tokens (`1.5 M`)
const ROW_TOKENS: usize = 6;

static EPOCH_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+):(.+)$").unwrap());

/// One package row of a yum transaction table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YumPackage {
    pub name: String,
    pub arch: String,
    pub version: String,
    pub epoch: Option<u64>,
    pub repository: String,
    pub size: String,
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableState {
    /// Looking for an opening frame line
    #[default]
    Scanning,
    /// Frame seen, expecting the column heading
    HeaderCheck,
    /// Heading seen, expecting the frame line under it
    HeaderRule,
    /// Expecting the `Installing:` section marker
    SectionCheck,
    /// Reading package rows until the closing frame line
    Body,
}

/// What the driver should do with the line just consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    None,
    Row(YumPackage),
    /// Line inside the body that is not a package row
    SkipRow,
    /// Structure check failed, drop the current block
    Abandon,
    /// Closing frame, commit the current block
    Close,
}

fn is_delimiter(line: &str) -> bool {
    let line = line.trim_end();
    line.len() == DELIMITER_WIDTH && line.bytes().all(|b| b == b'=')
}

/// State entered when scanning `line` from scratch
fn scan(line: &str) -> TableState {
    if is_delimiter(line) {
        TableState::HeaderCheck
    } else {
        TableState::Scanning
    }
}

/// Compute the next state and the action for one line
pub fn transition(state: TableState, line: &str) -> (TableState, LineAction) {
    match state {
        TableState::Scanning => (scan(line), LineAction::None),
        TableState::HeaderCheck => {
            let heading: Vec<&str> = line.split_whitespace().collect();
            if heading == EXPECTED_HEADING {
                (TableState::HeaderRule, LineAction::None)
            } else {
                debug!("Unable to parse heading for yum table, skipping (line was: {:?})", line);
                (scan(line), LineAction::Abandon)
            }
        }
        TableState::HeaderRule => {
            if is_delimiter(line) {
                (TableState::SectionCheck, LineAction::None)
            } else {
                debug!("Unable to find table start, giving up (line was: {:?})", line);
                (scan(line), LineAction::Abandon)
            }
        }
        TableState::SectionCheck => {
            if line.starts_with(SECTION_MARKER) {
                (TableState::Body, LineAction::None)
            } else {
                debug!(
                    "Unable to find table start with {:?}, giving up (line was: {:?})",
                    SECTION_MARKER, line
                );
                (scan(line), LineAction::Abandon)
            }
        }
        TableState::Body => {
            if is_delimiter(line) {
                debug!("Found table ending, finished installed packages parsing");
                return (TableState::Scanning, LineAction::Close);
            }
            match parse_row(line) {
                Some(package) => (TableState::Body, LineAction::Row(package)),
                None => (TableState::Body, LineAction::SkipRow),
            }
        }
    }
}

/// Parse one indented body row
fn parse_row(line: &str) -> Option<YumPackage> {
    if !line.starts_with(' ') {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != ROW_TOKENS {
        return None;
    }

    let (epoch, version) = match EPOCH_VERSION_RE.captures(tokens[2]) {
        Some(caps) => match caps[1].parse::<u64>() {
            Ok(epoch) => (Some(epoch), caps[2].to_string()),
            Err(_) => (None, tokens[2].to_string()),
        },
        None => (None, tokens[2].to_string()),
    };

    let package = YumPackage {
        name: tokens[0].to_string(),
        arch: tokens[1].to_string(),
        version,
        epoch,
        repository: tokens[3].to_string(),
        size: tokens[4..].concat(),
    };
    debug!("Found installed package report: {:?}", package);
    Some(package)
}

/// Drives [`transition`] over a stream of lines
#[derive(Debug, Default)]
pub struct TableParser {
    state: TableState,
    block: Vec<YumPackage>,
    packages: Vec<YumPackage>,
}

impl TableParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// Consume one line
    pub fn feed(&mut self, line: &str) {
        let (next, action) = transition(self.state, line);
        match action {
            LineAction::Row(package) => self.block.push(package),
            LineAction::Abandon => self.block.clear(),
            LineAction::Close => self.packages.append(&mut self.block),
            LineAction::None | LineAction::SkipRow => {}
        }
        self.state = next;
    }

    /// Finish the stream; a body cut short by end of input still counts
    pub fn finish(mut self) -> Vec<YumPackage> {
        if self.state == TableState::Body {
            self.packages.append(&mut self.block);
        }
        self.packages
    }
}

/// Handler for yum build output
#[derive(Debug, Clone, Copy, Default)]
pub struct YumHandler;

impl YumHandler {
    pub fn parse(&self, input: &str) -> Vec<YumPackage> {
        let mut parser = TableParser::new();
        for line in input.lines() {
            parser.feed(line);
        }
        parser.finish()
    }
}

impl LogHandler for YumHandler {
    fn run(&self, input: &str) -> HandlerResult {
        HandlerResult::Yum(self.parse(input))
    }
}
