//! In-silico cleavage of identified peptides into fully cleaved pieces, used
//! before residue statistics are computed

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// Cleavage rule as read from a configuration file. An empty `cleave_at`
/// disables cleavage
pub struct EnzymeBuilder {
    /// Residues after (or before, see `c_terminal`) which the chain is cut
    pub cleave_at: Option<String>,
    /// Skip a site followed by this residue
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        // Trypsin
        Self {
            cleave_at: Some("KR".into()),
            restrict: Some('P'),
            c_terminal: Some(true),
        }
    }
}

impl EnzymeBuilder {
    /// Build the rule, returning the offending text if it holds anything other
    /// than residue letters
    pub fn build(self) -> Result<Option<Enzyme>, String> {
        let cleave_at = self.cleave_at.unwrap_or_else(|| "KR".into());
        Enzyme::new(&cleave_at, self.restrict, self.c_terminal.unwrap_or(true))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Enzyme {
    pub cleave_at: String,
    // Skip cleaving if the site is followed by this residue
    pub skip_suffix: Option<char>,
    pub c_terminal: bool,
    #[serde(skip)]
    regex: Regex,
}

impl PartialEq for Enzyme {
    fn eq(&self, other: &Self) -> bool {
        self.cleave_at == other.cleave_at
            && self.skip_suffix == other.skip_suffix
            && self.c_terminal == other.c_terminal
    }
}

fn is_residue(c: char) -> bool {
    c.is_ascii() && VALID_AA.contains(&(c as u8))
}

impl Enzyme {
    pub fn new(
        cleave_at: &str,
        skip_suffix: Option<char>,
        c_terminal: bool,
    ) -> Result<Option<Self>, String> {
        if !cleave_at.chars().all(is_residue) {
            return Err(cleave_at.into());
        }
        if let Some(c) = skip_suffix.filter(|c| !is_residue(*c)) {
            return Err(c.to_string());
        }
        if cleave_at.is_empty() {
            return Ok(None);
        }
        let regex = Regex::new(&format!("[{}]", cleave_at)).map_err(|e| e.to_string())?;
        Ok(Some(Enzyme {
            cleave_at: cleave_at.into(),
            skip_suffix,
            c_terminal,
            regex,
        }))
    }

    fn cleavage_sites(&self, sequence: &str) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for mat in self.regex.find_iter(sequence) {
            let right = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if right < sequence.len() && sequence[right..].starts_with(skip) {
                    continue;
                }
            }
            ranges.push(left..right);
            left = right;
        }
        ranges.push(left..sequence.len());
        ranges
    }

    /// Fully cleaved, non-empty pieces of `sequence`
    pub fn cleave<'s>(&self, sequence: &'s str) -> impl Iterator<Item = &'s str> + 's {
        self.cleavage_sites(sequence)
            .into_iter()
            .filter_map(move |range| sequence.get(range))
            .filter(|piece| !piece.is_empty())
    }
}
