//! Static modification table used to propose localization candidates for a
//! mass shift ("unimod" candidates).

use std::{
    fmt::{Display, Write},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::mass::VALID_AA;

/// Mass tolerance (Da) when matching an interval center against the table
pub const UNIMOD_TOLERANCE: f64 = 0.01;

/// Peptide terminus carrying a modification rather than a residue
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Terminus {
    #[serde(rename = "N-term")]
    N,
    #[serde(rename = "C-term")]
    C,
}

impl Terminus {
    pub fn label(&self) -> &'static str {
        match self {
            Terminus::N => "N-term",
            Terminus::C => "C-term",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModificationSpecificity {
    PeptideN(Option<u8>),
    PeptideC(Option<u8>),
    ProteinN(Option<u8>),
    ProteinC(Option<u8>),
    Residue(u8),
}

impl ModificationSpecificity {
    /// Amino acid this specificity is restricted to, if any. Terminal
    /// specificities without a residue (e.g. `^`) return `None`
    pub fn residue(&self) -> Option<u8> {
        match self {
            ModificationSpecificity::PeptideN(r)
            | ModificationSpecificity::PeptideC(r)
            | ModificationSpecificity::ProteinN(r)
            | ModificationSpecificity::ProteinC(r) => *r,
            ModificationSpecificity::Residue(r) => Some(*r),
        }
    }

    /// Terminus of a terminal specificity without a residue restriction
    pub fn terminus(&self) -> Option<Terminus> {
        match self {
            ModificationSpecificity::PeptideN(None) | ModificationSpecificity::ProteinN(None) => {
                Some(Terminus::N)
            }
            ModificationSpecificity::PeptideC(None) | ModificationSpecificity::ProteinC(None) => {
                Some(Terminus::C)
            }
            _ => None,
        }
    }
}

impl Display for ModificationSpecificity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = match self {
            ModificationSpecificity::PeptideN(r) => {
                f.write_char('^')?;
                *r
            }
            ModificationSpecificity::PeptideC(r) => {
                f.write_char('$')?;
                *r
            }
            ModificationSpecificity::ProteinN(r) => {
                f.write_char('[')?;
                *r
            }
            ModificationSpecificity::ProteinC(r) => {
                f.write_char(']')?;
                *r
            }
            ModificationSpecificity::Residue(r) => Some(*r),
        };

        if let Some(r) = r {
            f.write_char(r as char)?;
        }

        Ok(())
    }
}

impl Serialize for ModificationSpecificity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModificationSpecificity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| de::Error::custom(format!("invalid modification site `{s}`: {e:?}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvalidModification {
    Empty,
    InvalidResidue(char),
    TooLong(String),
}

fn residue(rest: &str) -> Result<Option<u8>, InvalidModification> {
    match rest.chars().next() {
        Some(c) if VALID_AA.contains(&(c as u8)) => Ok(Some(c as u8)),
        Some(c) => Err(InvalidModification::InvalidResidue(c)),
        None => Ok(None),
    }
}

impl FromStr for ModificationSpecificity {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 2 {
            return Err(InvalidModification::TooLong(s.into()));
        }
        if let Some(rest) = s.strip_prefix('^') {
            return residue(rest).map(ModificationSpecificity::PeptideN);
        }
        if let Some(rest) = s.strip_prefix('$') {
            return residue(rest).map(ModificationSpecificity::PeptideC);
        }
        if let Some(rest) = s.strip_prefix('[') {
            return residue(rest).map(ModificationSpecificity::ProteinN);
        }
        if let Some(rest) = s.strip_prefix(']') {
            return residue(rest).map(ModificationSpecificity::ProteinC);
        }
        match residue(s)? {
            Some(r) if s.len() == 1 => Ok(ModificationSpecificity::Residue(r)),
            Some(_) => Err(InvalidModification::TooLong(s.into())),
            None => Err(InvalidModification::Empty),
        }
    }
}

/// A known modification: name, monoisotopic mass delta and allowed sites
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    pub mass: f64,
    pub sites: Vec<ModificationSpecificity>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModificationDatabase {
    modifications: Vec<Modification>,
}

impl ModificationDatabase {
    pub fn new(mut modifications: Vec<Modification>) -> Self {
        modifications.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        Self { modifications }
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// All modifications within `tolerance` Da of `mass`
    pub fn lookup(&self, mass: f64, tolerance: f64) -> impl Iterator<Item = &Modification> {
        self.modifications
            .iter()
            .filter(move |m| (m.mass - mass).abs() <= tolerance)
    }

    /// Residues that could carry `mass`, sorted & deduplicated, along with the
    /// names of the matching modifications
    pub fn residues(&self, mass: f64, tolerance: f64) -> (Vec<u8>, Vec<String>) {
        let mut residues = Vec::new();
        let mut names = Vec::new();
        for m in self.lookup(mass, tolerance) {
            names.push(m.name.clone());
            residues.extend(m.sites.iter().filter_map(|site| site.residue()));
        }
        residues.sort_unstable();
        residues.dedup();
        (residues, names)
    }

    /// Peptide termini that could carry `mass`, sorted & deduplicated
    pub fn termini(&self, mass: f64, tolerance: f64) -> Vec<Terminus> {
        let mut termini = self
            .lookup(mass, tolerance)
            .flat_map(|m| m.sites.iter().filter_map(|site| site.terminus()))
            .collect::<Vec<_>>();
        termini.sort_unstable();
        termini.dedup();
        termini
    }
}

const BUILTIN: &[(&str, f64, &str)] = &[
    ("Dehydrated", -18.010565, "S T D Y"),
    ("Glu->pyro-Glu", -18.010565, "^E"),
    ("Gln->pyro-Glu", -17.026549, "^Q"),
    ("Ammonia-loss", -17.026549, "^C N"),
    ("Amidated", -0.984016, "$"),
    ("Deamidated", 0.984016, "N Q"),
    ("Label:13C(6)", 6.020129, "K R"),
    ("Label:13C(6)15N(2)", 8.014199, "K"),
    ("Label:13C(6)15N(4)", 10.008269, "R"),
    ("Methyl", 14.01565, "K R D E H C ^"),
    ("Oxidation", 15.994915, "M W H C"),
    ("Cation:Na", 21.981943, "D E $"),
    ("Delta:H(2)C(2)", 26.01565, "K H ^"),
    ("Formyl", 27.994915, "K S T ^"),
    ("Dimethyl", 28.0313, "K R ^"),
    ("Dioxidation", 31.989829, "M W C"),
    ("Cation:K", 37.955882, "D E"),
    ("Acetyl", 42.010565, "K ^"),
    ("Guanidinyl", 42.021798, "K"),
    ("Trimethyl", 42.04695, "K"),
    ("Carbamyl", 43.005814, "K R C ^"),
    ("Carboxy", 43.989829, "D E K W"),
    ("Nitro", 44.985078, "Y W"),
    ("Methylthio", 45.987721, "C K N D ^"),
    ("Trioxidation", 47.984744, "C"),
    ("Carbamidomethyl", 57.021464, "C K H D E ^"),
    ("Propionamide", 71.037114, "C K ^"),
    ("Sulfo", 79.956815, "S T Y C"),
    ("Phospho", 79.966331, "S T Y"),
    ("GG", 114.042927, "K C S T"),
    ("Cysteinyl", 119.004099, "C"),
    ("iTRAQ4plex", 144.102063, "K Y ^"),
    ("Hex", 162.052824, "K N ^"),
    ("HexNAc", 203.079373, "N S T"),
    ("TMT6plex", 229.162932, "K ^"),
];

impl ModificationDatabase {
    /// A small table of frequently observed modifications and artefacts
    pub fn builtin() -> Self {
        let modifications = BUILTIN
            .iter()
            .map(|(name, mass, sites)| Modification {
                name: name.to_string(),
                mass: *mass,
                sites: sites
                    .split_whitespace()
                    .filter_map(|s| match s.parse() {
                        Ok(site) => Some(site),
                        Err(e) => {
                            log::error!("invalid built-in modification site {}: {:?}", s, e);
                            None
                        }
                    })
                    .collect(),
            })
            .collect();
        Self::new(modifications)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_modifications() {
        use InvalidModification::*;
        use ModificationSpecificity::*;
        assert_eq!("[".parse::<ModificationSpecificity>(), Ok(ProteinN(None)));
        assert_eq!(
            "[M".parse::<ModificationSpecificity>(),
            Ok(ProteinN(Some(b'M')))
        );
        assert_eq!(
            "]M".parse::<ModificationSpecificity>(),
            Ok(ProteinC(Some(b'M')))
        );
        assert_eq!("M".parse::<ModificationSpecificity>(), Ok(Residue(b'M')));
        assert_eq!(
            "Z".parse::<ModificationSpecificity>(),
            Err(InvalidResidue('Z'))
        );
        assert_eq!("".parse::<ModificationSpecificity>(), Err(Empty));
        assert_eq!(
            "^Z".parse::<ModificationSpecificity>(),
            Err(InvalidResidue('Z'))
        );
    }

    #[test]
    fn builtin_lookup() {
        let db = ModificationDatabase::builtin();
        assert_eq!(db.len(), BUILTIN.len());

        let (residues, names) = db.residues(15.9949, UNIMOD_TOLERANCE);
        assert_eq!(names, vec!["Oxidation".to_string()]);
        assert_eq!(residues, b"CHMW".to_vec());

        // Terminal specificities contribute their residue, bare termini do not
        let (residues, names) = db.residues(-17.0265, UNIMOD_TOLERANCE);
        assert_eq!(names.len(), 2);
        assert_eq!(residues, b"CNQ".to_vec());

        let (residues, names) = db.residues(-0.984, UNIMOD_TOLERANCE);
        assert_eq!(names, vec!["Amidated".to_string()]);
        assert!(residues.is_empty());

        assert_eq!(db.lookup(1234.5, UNIMOD_TOLERANCE).count(), 0);
    }

    #[test]
    fn terminal_sites() {
        let db = ModificationDatabase::builtin();
        assert_eq!(db.termini(42.0106, UNIMOD_TOLERANCE), vec![Terminus::N]);
        assert_eq!(db.termini(-0.984, UNIMOD_TOLERANCE), vec![Terminus::C]);
        // Cation:Na: D E and the bare C-terminus
        assert_eq!(db.termini(21.9819, UNIMOD_TOLERANCE), vec![Terminus::C]);
        assert!(db.termini(-17.0265, UNIMOD_TOLERANCE).is_empty());
        assert!(db.termini(15.9949, UNIMOD_TOLERANCE).is_empty());
        assert_eq!(Terminus::N.label(), "N-term");
    }

    #[test]
    fn deserialize_table() {
        let json = r#"[{"name": "Oxidation", "mass": 15.994915, "sites": ["M", "^W"]}]"#;
        let db: ModificationDatabase = serde_json::from_str(json).unwrap();
        let (residues, _) = db.residues(15.995, 0.01);
        assert_eq!(residues, vec![b'M', b'W']);

        let bad = r#"[{"name": "Bad", "mass": 1.0, "sites": ["MM"]}]"#;
        assert!(serde_json::from_str::<ModificationDatabase>(bad).is_err());
    }
}
