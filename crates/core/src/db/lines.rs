//! Source line → function address lookup.
//!
//! Debug info records (file, line, address) triples using paths from the
//! machine that built the recompiled binary. We resolve those paths against
//! the local source tree and then answer one question: does exactly one
//! function start near a given line of a given local file?

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

fn path_parts(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_lowercase)
        .collect()
}

/// Number of trailing path components shared by `foreign` and `local`,
/// compared case-insensitively. Stops at the first mismatch or `..`.
fn score_match(foreign: &[String], local: &[String]) -> usize {
    foreign
        .iter()
        .rev()
        .zip(local.iter().rev())
        .take_while(|(a, b)| a == b && a.as_str() != "..")
        .count()
}

#[derive(Debug, Clone, Default)]
pub struct LinesDb {
    code_files: Vec<String>,
    by_file_name: HashMap<String, Vec<usize>>,
    resolved: HashMap<String, Option<usize>>,
    lines: BTreeMap<usize, Vec<(u32, u64)>>,
    function_starts: HashSet<u64>,
}

impl LinesDb {
    /// Build a lookup over the given local source files. A file listed more
    /// than once is kept once.
    pub fn new<I, S>(code_files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let code_files: Vec<String> = code_files
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let mut by_file_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, path) in code_files.iter().enumerate() {
            if let Some(name) = path_parts(path).pop() {
                by_file_name.entry(name).or_default().push(idx);
            }
        }
        Self { code_files, by_file_name, ..Self::default() }
    }

    pub fn code_files(&self) -> &[String] {
        &self.code_files
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Local file best matching `foreign`, if exactly one scores highest.
    fn resolve_uncached(&self, foreign: &str) -> Option<usize> {
        let foreign_parts = path_parts(foreign);
        let candidates = self.by_file_name.get(foreign_parts.last()?)?;

        let scored: Vec<(usize, usize)> = candidates
            .iter()
            .map(|idx| (score_match(&foreign_parts, &path_parts(&self.code_files[*idx])), *idx))
            .collect();
        let best = scored.iter().map(|(score, _)| *score).max()?;
        if best == 0 {
            return None;
        }
        let mut winners = scored.iter().filter(|(score, _)| *score == best);
        let (_, winner) = winners.next()?;
        if winners.next().is_some() {
            tracing::debug!(path = foreign, "Ambiguous source path; ignoring its lines");
            return None;
        }
        Some(*winner)
    }

    fn resolve(&mut self, foreign: &str) -> Option<usize> {
        if let Some(cached) = self.resolved.get(foreign) {
            return *cached;
        }
        let result = self.resolve_uncached(foreign);
        self.resolved.insert(foreign.to_owned(), result);
        result
    }

    /// Record (line, address) pairs for a file named the way the debug info
    /// names it. Returns `false` when the file cannot be resolved locally,
    /// in which case the pairs are dropped.
    pub fn add_lines<I>(&mut self, filename: &str, lines: I) -> bool
    where
        I: IntoIterator<Item = (u32, u64)>,
    {
        let Some(idx) = self.resolve(filename) else {
            return false;
        };
        let bucket = self.lines.entry(idx).or_default();
        bucket.extend(lines);
        bucket.sort_unstable();
        bucket.dedup();
        true
    }

    pub fn add_line(&mut self, filename: &str, line: u32, addr: u64) -> bool {
        self.add_lines(filename, [(line, addr)])
    }

    /// Mark addresses that are true function entry points. Only these can be
    /// returned by [`LinesDb::search_line`].
    pub fn add_function_starts<I>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = u64>,
    {
        self.function_starts.extend(addrs);
    }

    /// Address of the single function that starts in `[line_start - 1,
    /// line_end]` of `path`. `line_end` defaults to `line_start`.
    ///
    /// Returns `None` (and logs) when no function or more than one function
    /// qualifies.
    pub fn search_line(&self, path: &str, line_start: u32, line_end: Option<u32>) -> Option<u64> {
        let line_end = line_end.unwrap_or(line_start).max(line_start);
        let idx = self
            .code_files
            .iter()
            .position(|local| local == path)
            .filter(|idx| self.lines.contains_key(idx))
            .or_else(|| self.resolve_uncached(path))?;
        let bucket = self.lines.get(&idx)?;

        let low = line_start.saturating_sub(1);
        let candidates: BTreeSet<u64> = bucket
            .iter()
            .filter(|(line, addr)| {
                (low..=line_end).contains(line) && self.function_starts.contains(addr)
            })
            .map(|(_, addr)| *addr)
            .collect();

        let mut iter = candidates.iter();
        match (iter.next(), iter.next()) {
            (Some(addr), None) => Some(*addr),
            (Some(_), Some(_)) => {
                tracing::error!("Debug data out of sync with function near: {path}:{line_start}");
                None
            }
            (None, _) => {
                tracing::error!(
                    "Failed to find function symbol with filename and line: {path}:{line_start}"
                );
                None
            }
        }
    }
}
