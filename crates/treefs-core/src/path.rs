// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Non-mutating path tokenizer

use std::cmp::Ordering;
use std::fmt;

/// Borrowed view of a `/`-separated path.
///
/// Empty components are ignored, so `""`, `"/"` and `"//"` all name the
/// root and `"/a//b/"` equals `"/a/b"`.
#[derive(Clone, Copy, Debug)]
pub struct FsPath<'a> {
    raw: &'a str,
}

impl<'a> FsPath<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    pub fn segments(&self) -> Segments<'a> {
        Segments {
            inner: self.raw.split('/'),
        }
    }

    /// Number of components below the root
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn is_root(&self) -> bool {
        self.segments().next().is_none()
    }

    /// Last component, `None` for the root
    pub fn file_name(&self) -> Option<&'a str> {
        self.segments().last()
    }

    /// Components of the parent directory
    pub fn parent_segments(&self) -> impl Iterator<Item = &'a str> {
        let keep = self.depth().saturating_sub(1);
        self.segments().take(keep)
    }

    /// True when `self` is `ancestor` or lies beneath it
    pub fn is_within(&self, ancestor: &FsPath<'_>) -> bool {
        let mut mine = self.segments();
        ancestor.segments().all(|seg| mine.next() == Some(seg))
    }

    /// Canonical `/a/b` spelling, `/` for the root
    pub fn normalized(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        self.segments().fold(String::with_capacity(self.raw.len() + 1), |mut out, seg| {
            out.push('/');
            out.push_str(seg);
            out
        })
    }

    /// Global acquisition order for locking two paths: fewer components
    /// first, then component-wise lexicographic.
    pub fn lock_cmp(&self, other: &FsPath<'_>) -> Ordering {
        self.depth()
            .cmp(&other.depth())
            .then_with(|| self.segments().cmp(other.segments()))
    }
}

impl fmt::Display for FsPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl PartialEq for FsPath<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.segments().eq(other.segments())
    }
}

impl Eq for FsPath<'_> {}

/// Iterator over the non-empty components of a path
#[derive(Clone, Debug)]
pub struct Segments<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.inner.by_ref().find(|seg| !seg.is_empty())
    }
}
