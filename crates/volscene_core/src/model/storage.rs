//! Storage node payload and the volume codec seam.
//!
//! # Responsibility
//! - Hold the file references (file name or URI, single or list) and read
//!   options of one volume node set.
//! - Define the `VolumeIo` codec contract used to read and write voxels.
//!
//! # Invariants
//! - A URI, when set, takes precedence over the plain file name.
//! - Reads report progress and errors as `StorageEvent`s; the storage node
//!   itself never logs.
//!
//! # See also
//! - `crate::io::nrrd` for the reference codec.

use crate::model::volume::{ImageData, VolumeKind, VolumeNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Storage flavor of a node set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// NRRD-only storage used by diffusion and generic vector volumes.
    Nrrd,
    /// Generic archetype storage that accepts any format the codec reads.
    VolumeArchetype,
}

/// Event reported while a storage node reads or writes.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    /// Fraction in `[0, 1]`.
    Progress(f64),
    Error(String),
}

/// Receives storage events of the storage nodes it is attached to.
pub trait StorageObserver {
    fn on_storage_event(&self, event: &StorageEvent);
}

/// Read parameters handed to a codec.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    /// Primary file.
    pub path: PathBuf,
    /// Additional files of a multi-file series.
    pub extra_paths: Vec<PathBuf>,
    /// Kind the caller expects the content to be.
    pub kind: VolumeKind,
    /// Flavor of the storage node issuing the read.
    pub storage: StorageKind,
    pub center_image: bool,
    pub use_orientation_from_file: bool,
    pub single_file: bool,
}

/// Voxels and geometry produced by a successful read.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedVolume {
    pub image: ImageData,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub directions: [[f64; 3]; 3],
    /// Free-form key/value pairs found in the file header.
    pub attributes: BTreeMap<String, String>,
}

impl LoadedVolume {
    /// Moves the loaded voxels and geometry into a volume node and hands
    /// back the header attributes.
    pub fn apply_to(self, volume: &mut VolumeNode) -> BTreeMap<String, String> {
        volume.image = Some(self.image);
        volume.spacing = self.spacing;
        volume.origin = self.origin;
        volume.directions = self.directions;
        self.attributes
    }
}

/// Write parameters handed to a codec.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a std::path::Path,
    pub volume: &'a VolumeNode,
    /// Node attributes; codecs may persist the ones they understand.
    pub attributes: &'a BTreeMap<String, String>,
}

/// Volume codec.
pub trait VolumeIo {
    /// Short codec name used in log lines.
    fn name(&self) -> &str;

    /// Reads one volume. Progress is reported through `progress`.
    fn read(
        &self,
        request: &ReadRequest,
        progress: &mut dyn FnMut(f64),
    ) -> Result<LoadedVolume, String>;

    /// Writes one volume.
    fn write(&self, request: &WriteRequest<'_>) -> Result<(), String>;
}

/// Storage node of a volume node set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageNode {
    pub kind: StorageKind,
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_names: Vec<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    pub center_image: bool,
    pub use_orientation_from_file: bool,
    pub single_file: bool,
}

impl StorageNode {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            file_name: None,
            file_names: Vec::new(),
            uri: None,
            uris: Vec::new(),
            center_image: false,
            use_orientation_from_file: true,
            single_file: false,
        }
    }

    /// Points the storage node at one reference, as a URI or a file name.
    pub fn set_reference(&mut self, reference: &str, is_remote: bool) {
        if is_remote {
            self.uri = Some(reference.to_string());
            self.file_name = None;
        } else {
            self.file_name = Some(reference.to_string());
            self.uri = None;
        }
    }

    /// Appends one reference of a multi-file series.
    pub fn add_reference(&mut self, reference: &str, is_remote: bool) {
        if is_remote {
            self.uris.push(reference.to_string());
        } else {
            self.file_names.push(reference.to_string());
        }
    }

    /// Primary reference (URI first).
    pub fn primary_reference(&self) -> Option<&str> {
        self.uri.as_deref().or(self.file_name.as_deref())
    }

    /// Additional series references (URIs first).
    pub fn extra_references(&self) -> impl Iterator<Item = &str> {
        self.uris
            .iter()
            .chain(self.file_names.iter())
            .map(String::as_str)
    }

    pub fn has_reference(&self) -> bool {
        self.primary_reference().is_some()
    }

    /// Reads the referenced volume.
    ///
    /// `resolve` maps a reference to a local path (remote references go
    /// through the owning scene's cache). Errors are returned and also
    /// reported through `sink`.
    pub fn read_data(
        &self,
        io: &dyn VolumeIo,
        kind: VolumeKind,
        resolve: &dyn Fn(&str) -> Result<PathBuf, String>,
        sink: &mut dyn FnMut(StorageEvent),
    ) -> Result<LoadedVolume, String> {
        let result = self.read_inner(io, kind, resolve, sink);
        if let Err(message) = &result {
            sink(StorageEvent::Error(message.clone()));
        }
        result
    }

    fn read_inner(
        &self,
        io: &dyn VolumeIo,
        kind: VolumeKind,
        resolve: &dyn Fn(&str) -> Result<PathBuf, String>,
        sink: &mut dyn FnMut(StorageEvent),
    ) -> Result<LoadedVolume, String> {
        let primary = self
            .primary_reference()
            .ok_or_else(|| "storage node has no file name or URI".to_string())?;
        let path = resolve(primary)?;
        let extra_paths = if self.single_file {
            Vec::new()
        } else {
            self.extra_references()
                .map(resolve)
                .collect::<Result<Vec<_>, _>>()?
        };

        let request = ReadRequest {
            path,
            extra_paths,
            kind,
            storage: self.kind,
            center_image: self.center_image,
            use_orientation_from_file: self.use_orientation_from_file,
            single_file: self.single_file,
        };
        io.read(&request, &mut |fraction| sink(StorageEvent::Progress(fraction)))
    }

    /// Writes `volume` to the primary reference.
    pub fn write_data(
        &self,
        io: &dyn VolumeIo,
        volume: &VolumeNode,
        attributes: &BTreeMap<String, String>,
        resolve: &dyn Fn(&str) -> Result<PathBuf, String>,
    ) -> Result<(), String> {
        let primary = self
            .primary_reference()
            .ok_or_else(|| "storage node has no file name or URI".to_string())?;
        if volume.image.is_none() {
            return Err("volume has no image data to write".to_string());
        }
        let path = resolve(primary)?;
        io.write(&WriteRequest {
            path: &path,
            volume,
            attributes,
        })
    }
}
