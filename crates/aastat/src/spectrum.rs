use std::cmp::Ordering;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::mass::Tolerance;

/// A centroided fragment peak
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f32,
    pub intensity: f32,
}

/// Fragment spectrum of a PSM, peaks sorted by m/z in ascending order
#[derive(Clone, Default, Debug, Serialize)]
pub struct Spectrum {
    pub id: String,
    peaks: Vec<Peak>,
}

impl Spectrum {
    pub fn new(id: String, mut peaks: Vec<Peak>) -> Self {
        peaks.retain(|peak| peak.mz.is_finite() && peak.intensity.is_finite());
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        Self { id, peaks }
    }

    /// Build a spectrum from parallel m/z and intensity arrays
    pub fn from_arrays(id: String, mz: &[f32], intensity: &[f32]) -> Self {
        let peaks = mz
            .iter()
            .zip(intensity)
            .map(|(&mz, &intensity)| Peak { mz, intensity })
            .collect();
        Self::new(id, peaks)
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }
}

/// Spectra addressable by identifier
#[derive(Clone, Default, Debug)]
pub struct SpectrumIndex {
    spectra: FnvHashMap<String, Spectrum>,
}

impl SpectrumIndex {
    pub fn get(&self, id: &str) -> Option<&Spectrum> {
        self.spectra.get(id)
    }

    pub fn insert(&mut self, spectrum: Spectrum) {
        self.spectra.insert(spectrum.id.clone(), spectrum);
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

impl FromIterator<Spectrum> for SpectrumIndex {
    fn from_iter<T: IntoIterator<Item = Spectrum>>(iter: T) -> Self {
        let mut index = SpectrumIndex::default();
        for spectrum in iter {
            index.insert(spectrum);
        }
        index
    }
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}

/// Binary search followed by linear search to select the most intense peak
/// within `tolerance` of `mz`
pub fn select_most_intense_peak(peaks: &[Peak], mz: f32, tolerance: Tolerance) -> Option<&Peak> {
    let (lo, hi) = tolerance.bounds(mz);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut max_int = f32::MIN;
    for peak in peaks[i..j]
        .iter()
        .filter(|peak| peak.mz >= lo && peak.mz <= hi)
    {
        if peak.intensity > max_int {
            max_int = peak.intensity;
            best_peak = Some(peak);
        }
    }
    best_peak
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_search_slice_smoke() {
        // Make sure that our query returns the maximal set of indices
        let data = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 1.75, 3.5);
        assert_eq!(bounds, (1, 6));
        assert!(data[bounds.0] <= 1.75);
        assert_eq!(&data[bounds.0..bounds.1], &[1.5, 2.0, 2.5, 3.0, 3.5]);

        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 0.0, 5.0);
        assert_eq!(bounds, (0, data.len()));
    }

    #[test]
    fn binary_search_slice_run() {
        let data = [1.0, 1.5, 1.5, 1.5, 1.5, 2.0, 2.5, 3.0, 3.0, 3.5, 4.0];
        let (left, right) = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 1.5, 3.25);
        assert!(data[left] <= 1.5);
        assert!(data[right] > 3.25);
        assert_eq!(
            &data[left..right],
            &[1.0, 1.5, 1.5, 1.5, 1.5, 2.0, 2.5, 3.0, 3.0]
        );
    }

    #[test]
    fn most_intense_peak() {
        let spectrum = Spectrum::from_arrays(
            "scan=1".into(),
            &[300.01, 100.0, 300.0, 299.99, 450.0],
            &[5.0, 10.0, 20.0, 15.0, 1.0],
        );
        assert_eq!(spectrum.peaks()[0].mz, 100.0);

        let tol = Tolerance::Da(-0.02, 0.02);
        let peak = select_most_intense_peak(spectrum.peaks(), 300.005, tol).unwrap();
        assert_eq!(peak.mz, 300.0);
        assert_eq!(peak.intensity, 20.0);

        assert!(select_most_intense_peak(spectrum.peaks(), 200.0, tol).is_none());
        assert!(select_most_intense_peak(&[], 200.0, tol).is_none());
    }

    #[test]
    fn index() {
        let index = vec![
            Spectrum::new("a".into(), vec![]),
            Spectrum::new("b".into(), vec![Peak::default()]),
        ]
        .into_iter()
        .collect::<SpectrumIndex>();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("b").map(|s| s.peaks().len()), Some(1));
        assert!(index.get("c").is_none());
    }
}
