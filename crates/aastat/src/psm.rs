use serde::{Deserialize, Serialize};

/// A peptide-spectrum match from an open search
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Psm {
    /// Unmodified peptide sequence, upper case one-letter residues
    pub sequence: String,
    /// Observed minus theoretical precursor mass, Da
    pub mass_shift: f64,
    pub score: f64,
    pub decoy: bool,
    /// Identifier used to look up the fragment spectrum
    pub spectrum: String,
    pub charge: u8,
}

/// A PSM is a decoy only if every protein it maps to is a decoy protein. An
/// empty prefix marks nothing as decoy
pub fn is_decoy<S: AsRef<str>>(proteins: &[S], prefix: &str) -> bool {
    !prefix.is_empty()
        && !proteins.is_empty()
        && proteins
            .iter()
            .all(|protein| protein.as_ref().trim().starts_with(prefix))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decoy_rule() {
        assert!(is_decoy(&["DECOY_sp|P1", "DECOY_sp|P2"], "DECOY_"));
        assert!(!is_decoy(&["DECOY_sp|P1", "sp|P2"], "DECOY_"));
        assert!(!is_decoy(&["sp|P1"], "DECOY_"));
        assert!(!is_decoy::<&str>(&[], "DECOY_"));
        assert!(is_decoy(&[String::from("rev_X")], "rev_"));
        assert!(!is_decoy(&["sp|P1|TARGET"], ""));
    }
}
