//! Export configuration.
//!
//! Recognized keys (camelCase, JSON or built in code):
//! `name`, `outputDir`, `objectNames`, `cloudNames`, `cloudAttribs`,
//! `writeInterval`, `chunking`, `compression`, `writeXdmf`.
//! [`H5WriteConfig::validate`] runs before any file is touched.

use crate::classify::compile_patterns;
use crate::io::cloud_writer::CloudAttribute;
use crate::io::schema::ChunkPolicy;
use crate::mesh_error::MeshWriteError;
use serde::Deserialize;
use std::path::PathBuf;

fn default_name() -> String {
    "h5Data".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("h5Data")
}

/// Settings of one exporter instance.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct H5WriteConfig {
    /// Base name of the container file; files are `<outputDir>/<name><N>.h5`.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Field name patterns (anchored regular expressions).
    #[serde(default)]
    pub object_names: Vec<String>,
    #[serde(default)]
    pub cloud_names: Vec<String>,
    #[serde(default)]
    pub cloud_attribs: Vec<CloudAttribute>,
    /// Steps between writes; must be positive.
    pub write_interval: i64,
    #[serde(default)]
    pub chunking: ChunkPolicy,
    /// Deflate level for chunked datasets.
    ///
    /// Ignored, with a warning, for HDF5 files opened through MPI-IO: data is
    /// written by its owning rank alone and parallel HDF5 only writes
    /// filtered datasets collectively.
    #[serde(default)]
    pub compression: Option<u8>,
    /// Emit XDMF descriptors next to the container on close.
    #[serde(default)]
    pub write_xdmf: bool,
}

impl H5WriteConfig {
    pub fn new(write_interval: i64) -> Self {
        Self {
            name: default_name(),
            output_dir: default_output_dir(),
            object_names: Vec::new(),
            cloud_names: Vec::new(),
            cloud_attribs: Vec::new(),
            write_interval,
            chunking: ChunkPolicy::default(),
            compression: None,
            write_xdmf: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.name = name.into();
        self.output_dir = dir.into();
        self
    }

    pub fn with_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_clouds<I, S>(mut self, names: I, attribs: &[CloudAttribute]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cloud_names = names.into_iter().map(Into::into).collect();
        self.cloud_attribs = attribs.to_vec();
        self
    }

    pub fn with_xdmf(mut self, enabled: bool) -> Self {
        self.write_xdmf = enabled;
        self
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, MeshWriteError> {
        serde_json::from_str(json).map_err(|e| MeshWriteError::Config(e.to_string()))
    }

    /// Rejects settings that would make the run ill-defined.
    pub fn validate(&self) -> Result<(), MeshWriteError> {
        if self.write_interval <= 0 {
            return Err(MeshWriteError::InvalidWriteInterval(self.write_interval));
        }
        if let Some(level) = self.compression {
            if level > 9 {
                return Err(MeshWriteError::Config(format!(
                    "compression level {level} outside 0..=9"
                )));
            }
        }
        if self.name.is_empty() {
            return Err(MeshWriteError::Config("empty file name".into()));
        }
        compile_patterns(&self.object_names)?;
        Ok(())
    }

    /// Write interval as a step count. Call after [`Self::validate`].
    pub fn interval_steps(&self) -> u64 {
        self.write_interval.max(1) as u64
    }

    /// Requested cloud attributes in first-seen order, duplicates removed.
    pub fn unique_cloud_attribs(&self) -> Vec<CloudAttribute> {
        let mut out: Vec<CloudAttribute> = Vec::with_capacity(self.cloud_attribs.len());
        for attr in &self.cloud_attribs {
            if !out.contains(attr) {
                out.push(*attr);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let cfg = H5WriteConfig::from_json_str(
            r#"{
                "objectNames": ["p", "U"],
                "cloudNames": ["kinematicCloud"],
                "cloudAttribs": ["origin-processor", "d", "velocity", "Us"],
                "writeInterval": 5,
                "compression": 4,
                "writeXdmf": true
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.name, "h5Data");
        assert_eq!(cfg.object_names, vec!["p", "U"]);
        assert_eq!(
            cfg.cloud_attribs,
            vec![
                CloudAttribute::OriginProcessor,
                CloudAttribute::Diameter,
                CloudAttribute::Velocity,
                CloudAttribute::SlipVelocity
            ]
        );
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.interval_steps(), 5);
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        for interval in [0, -3] {
            let err = H5WriteConfig::new(interval).validate().unwrap_err();
            assert_eq!(err, MeshWriteError::InvalidWriteInterval(interval));
        }
    }

    #[test]
    fn unknown_attribute_fails_to_parse() {
        let err = H5WriteConfig::from_json_str(
            r#"{"writeInterval": 1, "cloudAttribs": ["temperature"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MeshWriteError::Config(msg) if msg.contains("temperature")));
    }

    #[test]
    fn bad_pattern_and_compression_are_rejected() {
        let cfg = H5WriteConfig::new(1).with_objects(["p("]);
        assert!(matches!(
            cfg.validate(),
            Err(MeshWriteError::InvalidObjectPattern { .. })
        ));
        let mut cfg = H5WriteConfig::new(1);
        cfg.compression = Some(12);
        assert!(matches!(cfg.validate(), Err(MeshWriteError::Config(_))));
    }

    #[test]
    fn duplicate_attributes_collapse() {
        let cfg = H5WriteConfig::new(1).with_clouds(
            ["c"],
            &[
                CloudAttribute::Age,
                CloudAttribute::Position,
                CloudAttribute::Age,
            ],
        );
        assert_eq!(
            cfg.unique_cloud_attribs(),
            vec![CloudAttribute::Age, CloudAttribute::Position]
        );
    }
}
