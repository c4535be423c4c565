// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request commands for the TreeFS datagram transport

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a namespace node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    /// Single-letter form used on the wire (`f` or `d`)
    pub fn as_char(self) -> char {
        match self {
            FileKind::File => 'f',
            FileKind::Directory => 'd',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(FileKind::File),
            'd' => Some(FileKind::Directory),
            _ => None,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::File => write!(f, "file"),
            FileKind::Directory => write!(f, "directory"),
        }
    }
}

/// Command parse failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown operation '{0}'")]
    UnknownOp(String),
    #[error("operation '{op}' expects {expected}")]
    MissingOperand { op: char, expected: &'static str },
    #[error("unexpected trailing operand '{0}'")]
    TrailingOperand(String),
    #[error("invalid node type '{0}', expected 'f' or 'd'")]
    InvalidKind(String),
}

/// One request understood by the daemon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// `c <path> f|d`
    Create { path: String, kind: FileKind },
    /// `d <path>`
    Delete { path: String },
    /// `l <path>`
    Lookup { path: String },
    /// `m <src> <dest>`
    Move { src: String, dest: String },
    /// `p <output-file>`: dump the whole tree into a file on the daemon host
    Print { output: PathBuf },
}

impl Command {
    pub fn create(path: impl Into<String>, kind: FileKind) -> Self {
        Command::Create {
            path: path.into(),
            kind,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Command::Delete { path: path.into() }
    }

    pub fn lookup(path: impl Into<String>) -> Self {
        Command::Lookup { path: path.into() }
    }

    pub fn rename(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Command::Move {
            src: src.into(),
            dest: dest.into(),
        }
    }

    pub fn print(output: impl Into<PathBuf>) -> Self {
        Command::Print {
            output: output.into(),
        }
    }

    /// Parse a single request.
    ///
    /// Fields are separated by ASCII whitespace. Trailing NUL bytes, as sent
    /// by C clients that include the string terminator in the datagram, are
    /// ignored.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let text = input.trim_end_matches('\0');
        let mut tokens = text.split_ascii_whitespace();
        let op = tokens.next().ok_or(ParseError::Empty)?;

        let mut chars = op.chars();
        let (Some(op_char), None) = (chars.next(), chars.next()) else {
            return Err(ParseError::UnknownOp(op.to_string()));
        };

        let command = match op_char {
            'c' => {
                let path = Self::operand(&mut tokens, op_char, "a path and a node type")?;
                let kind_token = Self::operand(&mut tokens, op_char, "a path and a node type")?;
                let mut kind_chars = kind_token.chars();
                let kind = match (kind_chars.next(), kind_chars.next()) {
                    (Some(c), None) => FileKind::from_char(c),
                    _ => None,
                }
                .ok_or_else(|| ParseError::InvalidKind(kind_token.to_string()))?;
                Command::create(path, kind)
            }
            'd' => Command::delete(Self::operand(&mut tokens, op_char, "a path")?),
            'l' => Command::lookup(Self::operand(&mut tokens, op_char, "a path")?),
            'm' => {
                let src = Self::operand(&mut tokens, op_char, "a source and a destination")?;
                let dest = Self::operand(&mut tokens, op_char, "a source and a destination")?;
                Command::rename(src, dest)
            }
            'p' => Command::print(Self::operand(&mut tokens, op_char, "an output file")?),
            _ => return Err(ParseError::UnknownOp(op.to_string())),
        };

        if let Some(extra) = tokens.next() {
            return Err(ParseError::TrailingOperand(extra.to_string()));
        }
        Ok(command)
    }

    /// Parse one line of a command file. Blank lines and `#` comments yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        Self::parse(trimmed).map(Some)
    }

    fn operand<'a>(
        tokens: &mut impl Iterator<Item = &'a str>,
        op: char,
        expected: &'static str,
    ) -> Result<&'a str, ParseError> {
        tokens.next().ok_or(ParseError::MissingOperand { op, expected })
    }

    /// Wire form of the command, the inverse of [`Command::parse`]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn op_char(&self) -> char {
        match self {
            Command::Create { .. } => 'c',
            Command::Delete { .. } => 'd',
            Command::Lookup { .. } => 'l',
            Command::Move { .. } => 'm',
            Command::Print { .. } => 'p',
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Delete { .. } => "delete",
            Command::Lookup { .. } => "lookup",
            Command::Move { .. } => "move",
            Command::Print { .. } => "print",
        }
    }

    pub fn is_print(&self) -> bool {
        matches!(self, Command::Print { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { path, kind } => write!(f, "c {} {}", path, kind.as_char()),
            Command::Delete { path } => write!(f, "d {}", path),
            Command::Lookup { path } => write!(f, "l {}", path),
            Command::Move { src, dest } => write!(f, "m {} {}", src, dest),
            Command::Print { output } => write!(f, "p {}", output.display()),
        }
    }
}

impl std::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}
