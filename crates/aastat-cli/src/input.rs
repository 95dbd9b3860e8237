use std::path::PathBuf;

use aastat_core::parameters::{Builder, Parameters};
use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Clone, Debug)]
/// Actual run settings - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub parameters: Parameters,
    pub columns: Columns,
    pub psm_paths: Vec<String>,
    pub spectra_path: Option<String>,
    pub modifications_path: Option<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input settings deserialized from JSON file
pub struct Input {
    #[serde(default)]
    parameters: Builder,
    columns: Option<ColumnOptions>,
    psm_paths: Option<Vec<String>>,
    spectra_path: Option<String>,
    modifications_path: Option<String>,
    output_directory: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ColumnOptions {
    peptide: Option<String>,
    mass_shift: Option<String>,
    score: Option<String>,
    spectrum: Option<String>,
    charge: Option<String>,
    decoy: Option<String>,
    proteins: Option<String>,
    protein_delimiter: Option<char>,
}

/// Column names of the PSM table
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Columns {
    pub peptide: String,
    pub mass_shift: String,
    pub score: String,
    pub spectrum: String,
    pub charge: String,
    /// Boolean decoy column. Takes precedence over `proteins`
    pub decoy: String,
    /// Protein accessions, used with the decoy prefix when there is no decoy column
    pub proteins: String,
    pub protein_delimiter: char,
}

impl Default for Columns {
    fn default() -> Self {
        ColumnOptions::default().into()
    }
}

impl From<ColumnOptions> for Columns {
    fn from(value: ColumnOptions) -> Self {
        Self {
            peptide: value.peptide.unwrap_or_else(|| "peptide".into()),
            mass_shift: value.mass_shift.unwrap_or_else(|| "mass_shift".into()),
            score: value.score.unwrap_or_else(|| "score".into()),
            spectrum: value.spectrum.unwrap_or_else(|| "spectrum".into()),
            charge: value.charge.unwrap_or_else(|| "charge".into()),
            decoy: value.decoy.unwrap_or_else(|| "decoy".into()),
            proteins: value.proteins.unwrap_or_else(|| "proteins".into()),
            protein_delimiter: value.protein_delimiter.unwrap_or(';'),
        }
    }
}

/// Fragment spectrum as stored in the spectra JSON file
#[derive(Deserialize, Debug)]
pub struct SpectrumRecord {
    pub id: String,
    pub mz: Vec<f32>,
    pub intensity: Vec<f32>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(psm_paths) = matches.get_many::<String>("psm_paths") {
            log::trace!("overriding `psm_paths` parameter.");
            input.psm_paths = Some(psm_paths.into_iter().map(|p| p.into()).collect());
        }
        if let Some(spectra) = matches.get_one::<String>("spectra") {
            log::trace!("overriding `spectra_path` parameter.");
            input.spectra_path = Some(spectra.into());
        }
        if let Some(modifications) = matches.get_one::<String>("modifications") {
            log::trace!("overriding `modifications_path` parameter.");
            input.modifications_path = Some(modifications.into());
        }
        if let Some(fdr) = matches.get_one::<f64>("fdr") {
            log::trace!("overriding `parameters.fdr` parameter.");
            input.parameters.fdr = Some(*fdr);
        }
        if let Some(batch_size) = matches.get_one::<usize>("batch-size") {
            log::trace!("overriding `parameters.batch_size` parameter.");
            input.parameters.batch_size = Some(*batch_size);
        }

        ensure!(
            input.psm_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`psm_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let parameters = self
            .parameters
            .make_parameters()
            .map_err(aastat_core::Error::from)?;

        let psm_paths = self.psm_paths.unwrap_or_default();
        ensure!(!psm_paths.is_empty(), "`psm_paths` must not be empty");

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            parameters,
            columns: self.columns.map(Into::into).unwrap_or_default(),
            psm_paths,
            spectra_path: self.spectra_path,
            modifications_path: self.modifications_path,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn columns_and_defaults() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(
            r#"{
                "parameters": {"fdr": 0.05, "labels": "MNQ"},
                "columns": {"peptide": "Peptide", "protein_delimiter": ","},
                "psm_paths": ["psms.tsv"]
            }"#,
        )?;
        let settings = input.build()?;
        assert_eq!(settings.parameters.fdr, 0.05);
        assert_eq!(settings.parameters.labels, b"MNQ".to_vec());
        assert_eq!(settings.columns.peptide, "Peptide");
        assert_eq!(settings.columns.score, "score");
        assert_eq!(settings.columns.protein_delimiter, ',');
        assert!(settings.spectra_path.is_none());
        Ok(())
    }

    #[test]
    fn invalid_parameters() {
        let input: Input = serde_json::from_str(
            r#"{"parameters": {"bin_width": -1.0}, "psm_paths": ["psms.tsv"]}"#,
        )
        .unwrap();
        let err = input.build().unwrap_err();
        assert!(err.to_string().contains("bin width"), "{}", err);

        let input: Input = serde_json::from_str("{}").unwrap();
        assert!(input.build().is_err());
    }
}
