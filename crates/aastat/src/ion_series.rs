use serde::{Deserialize, Serialize};

use crate::mass::{Mass, Residue, H2O};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    /// N-terminal ion series (a/b/c)
    pub fn is_n_terminal(&self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
}

impl Ion {
    /// m/z of this fragment at `charge`
    pub fn mz(&self, charge: u8) -> f32 {
        let charge = charge.max(1) as f32;
        (self.monoisotopic_mass + charge * crate::mass::PROTON) / charge
    }
}

/// Generate fragment ions for a peptide isoform, i.e. a sequence of residues
/// that may carry mass shifts
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    residues: &'p [Residue],
    idx: usize,
}

impl<'p> IonSeries<'p> {
    /// Create a new [`IonSeries`] iterator for an isoform
    pub fn new(residues: &'p [Residue], kind: Kind) -> Self {
        const C: f32 = 12.0;
        const O: f32 = 15.994914;
        const H: f32 = 1.007825;
        const PRO: f32 = 1.0072764;
        const N: f32 = 14.003074;
        const NH3: f32 = N + H * 2.0 + PRO;

        let monoisotopic = residues.iter().map(Mass::monoisotopic).sum::<f32>() + H2O;
        let cumulative_mass = match kind {
            Kind::A => -(C + O),
            Kind::B => 0.0,
            Kind::C => NH3,
            Kind::X => monoisotopic + (C + O - NH3 + N + H),
            Kind::Y => monoisotopic,
            Kind::Z => monoisotopic - NH3,
        };
        Self {
            kind,
            cumulative_mass,
            residues,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Dynamic programming solution - memoize cumulative mass of
    // peptide fragment for fast fragment ion generation
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.residues.len() {
            return None;
        }
        let r = self.residues.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::A | Kind::B | Kind::C => r.monoisotopic(),
            Kind::X | Kind::Y | Kind::Z => -r.monoisotopic(),
        };
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::PROTON;

    fn peptide(s: &str) -> Vec<Residue> {
        s.bytes().map(Residue::Just).collect()
    }

    fn check_within<I: Iterator<Item = Ion>>(iter: I, expected_mz: &[f32]) {
        let observed = iter.map(|ion| ion.monoisotopic_mass).collect::<Vec<f32>>();
        assert_eq!(expected_mz.len(), observed.len());
        assert!(
            expected_mz
                .iter()
                .zip(observed.iter())
                .all(|(a, b)| (a - b).abs() < 0.005),
            "{:?}",
            expected_mz
                .iter()
                .zip(observed.iter())
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>()
        );
    }

    macro_rules! ions {
        ($peptide:expr, $kind:expr, $charge:expr) => {{
            IonSeries::new($peptide, $kind).map(|mut ion| {
                ion.monoisotopic_mass = (ion.monoisotopic_mass + $charge * PROTON) / $charge;
                ion
            })
        }};
    }

    #[test]
    fn abc_xyz() {
        let peptide = peptide("PEPTIDE");
        let expected_a = vec![70.065, 199.108, 296.160, 397.208, 510.292, 625.32];
        let expected_b = vec![98.0600, 227.1026, 324.155, 425.2030, 538.287, 653.314];
        let expected_c = vec![115.086, 244.129, 341.182, 442.229, 555.314, 670.341];
        let expected_x = vec![729.294, 600.251, 503.198, 402.151, 289.066, 174.039];
        let expected_y = vec![703.314, 574.2719, 477.219, 376.171, 263.0874, 148.0604];
        let expected_z = vec![686.288, 557.245, 460.193, 359.145, 246.061, 131.034];

        check_within(ions!(&peptide, Kind::A, 1.0), &expected_a);
        check_within(ions!(&peptide, Kind::B, 1.0), &expected_b);
        check_within(ions!(&peptide, Kind::C, 1.0), &expected_c);
        check_within(ions!(&peptide, Kind::X, 1.0), &expected_x);
        check_within(ions!(&peptide, Kind::Y, 1.0), &expected_y);
        check_within(ions!(&peptide, Kind::Z, 1.0), &expected_z);
    }

    #[test]
    fn doubly_charged() {
        let peptide = peptide("PEPTIDE");
        let expected_mz = vec![352.161, 287.640, 239.113, 188.589, 132.047, 74.534];
        check_within(ions!(&peptide, Kind::Y, 2.0), &expected_mz);

        let y1 = IonSeries::new(&peptide, Kind::Y).last().unwrap();
        assert!((y1.mz(2) - 74.534).abs() < 0.005);
        assert!((y1.mz(1) - 148.0604).abs() < 0.005);
    }

    #[test]
    fn shifted_residue() {
        // +15.9949 on the C-terminal E moves every y ion, but no b ion
        let mut shifted = peptide("PEPTIDE");
        shifted[6] = Residue::Mod(b'E', 15.9949);

        let expected_b = vec![98.0600, 227.1026, 324.155, 425.2030, 538.287, 653.314];
        let expected_y = vec![719.309, 590.267, 493.214, 392.166, 279.082, 164.055];
        check_within(ions!(&shifted, Kind::B, 1.0), &expected_b);
        check_within(ions!(&shifted, Kind::Y, 1.0), &expected_y);
    }

    #[test]
    fn short_sequences() {
        assert_eq!(IonSeries::new(&[], Kind::B).count(), 0);
        assert_eq!(IonSeries::new(&peptide("K"), Kind::Y).count(), 0);
        assert_eq!(IonSeries::new(&peptide("GK"), Kind::Y).count(), 1);
    }
}
