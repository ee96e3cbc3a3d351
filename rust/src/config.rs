//! Configuration for queue processing and work roots.

use pyo3::prelude::*;

use crate::expiration::RootTag;
use crate::logging::VERBOSITY_SILENT;

/// Engine configuration shared by a work root and its update queue.
#[pyclass]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Logging verbosity (0=silent, 1=changes, 2=checks, 3=debug)
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Mode the root was created in
    pub root_tag: RootTag,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: VERBOSITY_SILENT,
            root_tag: RootTag::Legacy,
        }
    }
}

impl EngineConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_root_tag(mut self, root_tag: RootTag) -> Self {
        self.root_tag = root_tag;
        self
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (verbosity=None, root_tag=None))]
    fn py_new(verbosity: Option<u8>, root_tag: Option<u8>) -> PyResult<Self> {
        let defaults = Self::default();
        let root_tag = match root_tag {
            None => defaults.root_tag,
            Some(tag) => RootTag::from_u8(tag).ok_or_else(|| {
                pyo3::exceptions::PyValueError::new_err(format!("Unknown root tag: {}", tag))
            })?,
        };
        Ok(Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            root_tag,
        })
    }

    #[getter(root_tag)]
    fn py_root_tag(&self) -> u8 {
        self.root_tag.as_u8()
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(verbosity={}, root_tag={})",
            self.verbosity, self.root_tag
        )
    }
}
