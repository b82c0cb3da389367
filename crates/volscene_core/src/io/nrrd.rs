//! NRRD volume codec.
//!
//! # Responsibility
//! - Read attached (`.nrrd`) and detached (`.nhdr` + `data file:`) NRRD
//!   volumes with `ascii`/`text`/`raw` encodings.
//! - Classify content (scalar, vector, diffusion weighted, diffusion
//!   tensor) per storage flavor and reject reads for an incompatible
//!   requested kind.
//! - Write attached ASCII NRRD.
//!
//! # Invariants
//! - Geometry is returned in RAS; LPS headers are flipped on read.
//! - Voxel values are stored component-fastest, then i, j, k.

use crate::model::storage::{LoadedVolume, ReadRequest, StorageKind, VolumeIo, WriteRequest};
use crate::model::volume::{centered_origin, ImageData, ScalarType, VolumeKind, IDENTITY_DIRECTIONS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};
use std::path::Path;

static MAGIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^NRRD000[1-5]$").expect("valid nrrd magic regex"));
static VECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\(\s*([^,()\s]+)\s*,\s*([^,()\s]+)\s*,\s*([^,()\s]+)\s*\)\s*")
        .expect("valid nrrd vector regex")
});

/// Header key prefix that marks diffusion-weighted content.
pub const DWI_GRADIENT_KEY_PREFIX: &str = "DWMRI_gradient_";

/// Widest sample type (`double`).
const MAX_SAMPLE_BYTES: usize = 8;

pub type NrrdResult<T> = Result<T, NrrdError>;

/// NRRD codec error.
#[derive(Debug)]
pub enum NrrdError {
    Io(std::io::Error),
    Header(String),
    Data(String),
    Unsupported(String),
}

impl Display for NrrdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "nrrd io error: {err}"),
            Self::Header(message) => write!(f, "invalid nrrd header: {message}"),
            Self::Data(message) => write!(f, "invalid nrrd data: {message}"),
            Self::Unsupported(message) => write!(f, "unsupported nrrd content: {message}"),
        }
    }
}

impl Error for NrrdError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NrrdError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Parsed NRRD header.
#[derive(Debug, Clone, Default)]
pub struct NrrdHeader {
    pub fields: BTreeMap<String, String>,
    pub key_values: BTreeMap<String, String>,
}

impl NrrdHeader {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> NrrdResult<&str> {
        self.field(name)
            .ok_or_else(|| NrrdError::Header(format!("missing field `{name}`")))
    }

    /// Axis kinds, `None` when the field is absent.
    pub fn kinds(&self) -> Option<Vec<String>> {
        self.field("kinds")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
    }

    /// Content classification from kinds and key/value pairs.
    pub fn content_kind(&self) -> VolumeKind {
        if self
            .key_values
            .keys()
            .any(|key| key.starts_with(DWI_GRADIENT_KEY_PREFIX))
        {
            return VolumeKind::DiffusionWeighted;
        }
        let kinds = self.kinds().unwrap_or_default();
        if kinds.iter().any(|kind| kind.ends_with("symmetric-matrix")) {
            return VolumeKind::DiffusionTensor;
        }
        if kinds.iter().any(|kind| is_vector_kind(kind)) {
            return VolumeKind::Vector;
        }
        VolumeKind::Scalar
    }
}

impl NrrdHeader {
    /// Classification as seen by one storage flavor. Archetype storage
    /// reads the extra axis of an undeclared 4-D file as components.
    pub fn content_kind_for(&self, storage: StorageKind) -> VolumeKind {
        let content = self.content_kind();
        let four_d = self.field("dimension").map(str::trim) == Some("4");
        if storage == StorageKind::VolumeArchetype && content == VolumeKind::Scalar && four_d {
            return VolumeKind::Vector;
        }
        content
    }
}

fn is_vector_kind(kind: &str) -> bool {
    kind.ends_with("vector") || kind.ends_with("-color") || kind == "list"
}

fn is_spatial_kind(kind: &str) -> bool {
    matches!(kind, "domain" | "space" | "time")
}

/// Whether content of kind `content` can be read as `requested`.
pub fn is_compatible(content: VolumeKind, requested: VolumeKind) -> bool {
    content == requested || (content == VolumeKind::Scalar && requested == VolumeKind::LabelMap)
}

/// Splits a file into header text and the data offset after the first
/// blank line. Detached headers have no blank line; the offset is then the
/// file length.
fn split_header(bytes: &[u8]) -> (String, usize) {
    let mut start = 0usize;
    let mut lines = Vec::new();
    while start < bytes.len() {
        let end = bytes[start..]
            .iter()
            .position(|byte| *byte == b'\n')
            .map(|offset| start + offset)
            .unwrap_or(bytes.len());
        let line = String::from_utf8_lossy(&bytes[start..end])
            .trim_end_matches('\r')
            .to_string();
        start = (end + 1).min(bytes.len());
        if line.is_empty() {
            return (lines.join("\n"), start);
        }
        lines.push(line);
    }
    (lines.join("\n"), bytes.len())
}

/// Parses header text (magic line included).
pub fn parse_header(text: &str) -> NrrdResult<NrrdHeader> {
    let mut lines = text.lines();
    let magic = lines.next().unwrap_or_default().trim();
    if !MAGIC_RE.is_match(magic) {
        return Err(NrrdError::Header(format!("bad magic `{magic}`")));
    }

    let mut header = NrrdHeader::default();
    for line in lines {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(":=") {
            header
                .key_values
                .insert(key.trim().to_string(), value.trim().to_string());
        } else if let Some((field, value)) = line.split_once(':') {
            header
                .fields
                .insert(field.trim().to_ascii_lowercase(), value.trim().to_string());
        } else {
            return Err(NrrdError::Header(format!("unparsable line `{line}`")));
        }
    }
    Ok(header)
}

fn parse_scalar_type(value: &str) -> NrrdResult<ScalarType> {
    let scalar_type = match value.trim() {
        "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::UnsignedChar,
        "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
            ScalarType::Short
        }
        "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
            ScalarType::UnsignedShort
        }
        "int" | "signed int" | "int32" | "int32_t" => ScalarType::Int,
        "float" => ScalarType::Float,
        "double" => ScalarType::Double,
        other => return Err(NrrdError::Unsupported(format!("type `{other}`"))),
    };
    Ok(scalar_type)
}

fn scalar_type_name(scalar_type: ScalarType) -> &'static str {
    match scalar_type {
        ScalarType::UnsignedChar => "uchar",
        ScalarType::Short => "short",
        ScalarType::UnsignedShort => "ushort",
        ScalarType::Int => "int",
        ScalarType::Float => "float",
        ScalarType::Double => "double",
    }
}

fn parse_vector(value: &str) -> NrrdResult<Option<[f64; 3]>> {
    if value.trim() == "none" {
        return Ok(None);
    }
    let captures = VECTOR_RE
        .captures(value)
        .ok_or_else(|| NrrdError::Header(format!("bad vector `{value}`")))?;
    let mut out = [0.0; 3];
    for (axis, slot) in out.iter_mut().enumerate() {
        *slot = captures[axis + 1]
            .parse::<f64>()
            .map_err(|_| NrrdError::Header(format!("bad vector `{value}`")))?;
    }
    Ok(Some(out))
}

/// Splits `(a,b,c) none (d,e,f)` into per-axis entries.
fn split_vectors(value: &str) -> NrrdResult<Vec<Option<[f64; 3]>>> {
    let mut rest = value.trim();
    let mut out = Vec::new();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("none") {
            out.push(None);
            rest = tail.trim_start();
            continue;
        }
        let captures = VECTOR_RE
            .captures(rest)
            .ok_or_else(|| NrrdError::Header(format!("bad vector list `{value}`")))?;
        let matched = captures.get(0).map(|m| m.end()).unwrap_or(rest.len());
        out.push(parse_vector(&rest[..matched])?);
        rest = rest[matched..].trim_start();
    }
    Ok(out)
}

/// `true` when the header space is LPS-like and must be flipped to RAS.
fn space_is_lps(header: &NrrdHeader) -> NrrdResult<bool> {
    match header.field("space").map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("right-anterior-superior" | "ras") => Ok(false),
        Some("left-posterior-superior" | "lps") => Ok(true),
        Some(other) => Err(NrrdError::Unsupported(format!("space `{other}`"))),
    }
}

struct Layout {
    dimensions: [usize; 3],
    components: usize,
    component_axis: Option<usize>,
    sizes: Vec<usize>,
    /// Total sample count; its byte size fits in `usize`.
    count: usize,
}

fn layout(header: &NrrdHeader) -> NrrdResult<Layout> {
    let dimension: usize = header
        .require("dimension")?
        .parse()
        .map_err(|_| NrrdError::Header("bad `dimension`".to_string()))?;
    let sizes = header
        .require("sizes")?
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| NrrdError::Header("bad `sizes`".to_string()))?;
    if sizes.len() != dimension {
        return Err(NrrdError::Header(format!(
            "`sizes` has {} entries for dimension {dimension}",
            sizes.len()
        )));
    }

    let component_axis = match dimension {
        3 => None,
        4 => {
            let axis = header
                .kinds()
                .and_then(|kinds| kinds.iter().position(|kind| !is_spatial_kind(kind)))
                .unwrap_or(0);
            Some(axis)
        }
        other => {
            return Err(NrrdError::Unsupported(format!("dimension {other}")));
        }
    };

    let count = sizes
        .iter()
        .try_fold(1usize, |total, size| total.checked_mul(*size))
        .filter(|count| count.checked_mul(MAX_SAMPLE_BYTES).is_some())
        .ok_or_else(|| NrrdError::Header("sizes overflow".to_string()))?;

    let spatial: Vec<usize> = (0..dimension)
        .filter(|axis| Some(*axis) != component_axis)
        .map(|axis| sizes[axis])
        .collect();
    Ok(Layout {
        dimensions: [spatial[0], spatial[1], spatial[2]],
        components: component_axis.map(|axis| sizes[axis]).unwrap_or(1),
        component_axis,
        sizes,
        count,
    })
}

fn geometry(header: &NrrdHeader) -> NrrdResult<([f64; 3], [[f64; 3]; 3], [f64; 3])> {
    let flip = if space_is_lps(header)? { -1.0 } else { 1.0 };
    let mut spacing = [1.0; 3];
    let mut directions = IDENTITY_DIRECTIONS;

    if let Some(value) = header.field("space directions") {
        let vectors: Vec<[f64; 3]> = split_vectors(value)?.into_iter().flatten().collect();
        if vectors.len() != 3 {
            return Err(NrrdError::Header(format!(
                "expected 3 spatial `space directions`, found {}",
                vectors.len()
            )));
        }
        for (axis, vector) in vectors.iter().enumerate() {
            let ras = [vector[0] * flip, vector[1] * flip, vector[2]];
            let norm = (ras[0] * ras[0] + ras[1] * ras[1] + ras[2] * ras[2]).sqrt();
            if norm == 0.0 {
                return Err(NrrdError::Header("zero-length space direction".to_string()));
            }
            spacing[axis] = norm;
            for row in 0..3 {
                directions[row][axis] = ras[row] / norm;
            }
        }
    } else if let Some(value) = header.field("spacings") {
        let values: Vec<f64> = value
            .split_whitespace()
            .filter(|token| *token != "nan" && *token != "NaN")
            .map(str::parse::<f64>)
            .collect::<Result<_, _>>()
            .map_err(|_| NrrdError::Header("bad `spacings`".to_string()))?;
        if values.len() == 3 {
            spacing = [values[0], values[1], values[2]];
        }
    }

    let origin = match header.field("space origin") {
        Some(value) => {
            let origin = parse_vector(value)?.unwrap_or([0.0; 3]);
            [origin[0] * flip, origin[1] * flip, origin[2]]
        }
        None => [0.0; 3],
    };
    Ok((spacing, directions, origin))
}

fn decode_ascii(bytes: &[u8], count: usize) -> NrrdResult<Vec<f64>> {
    let text = String::from_utf8_lossy(bytes);
    let values = text
        .split_whitespace()
        .take(count)
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| NrrdError::Data(err.to_string()))?;
    if values.len() != count {
        return Err(NrrdError::Data(format!(
            "expected {count} values, found {}",
            values.len()
        )));
    }
    Ok(values)
}

fn decode_raw(
    bytes: &[u8],
    count: usize,
    scalar_type: ScalarType,
    endian: Endian,
) -> NrrdResult<Vec<f64>> {
    let size = scalar_type.byte_size();
    let needed = count
        .checked_mul(size)
        .ok_or_else(|| NrrdError::Data(format!("{count} samples overflow")))?;
    if bytes.len() < needed {
        return Err(NrrdError::Data(format!(
            "expected {needed} bytes, found {}",
            bytes.len()
        )));
    }
    // Raw data sits at the end of the file.
    let data = &bytes[bytes.len() - needed..];
    let values = data
        .chunks_exact(size)
        .map(|chunk| decode_value(chunk, scalar_type, endian))
        .collect();
    Ok(values)
}

fn decode_value(chunk: &[u8], scalar_type: ScalarType, endian: Endian) -> f64 {
    macro_rules! read {
        ($ty:ty, $n:expr) => {{
            let mut buf = [0u8; $n];
            buf.copy_from_slice(chunk);
            match endian {
                Endian::Little => <$ty>::from_le_bytes(buf) as f64,
                Endian::Big => <$ty>::from_be_bytes(buf) as f64,
            }
        }};
    }
    match scalar_type {
        ScalarType::UnsignedChar => f64::from(chunk[0]),
        ScalarType::Short => read!(i16, 2),
        ScalarType::UnsignedShort => read!(u16, 2),
        ScalarType::Int => read!(i32, 4),
        ScalarType::Float => read!(f32, 4),
        ScalarType::Double => read!(f64, 8),
    }
}

/// Moves the component axis to the front so values are component-fastest.
fn reorder_components(values: Vec<f64>, layout: &Layout) -> Vec<f64> {
    let axis = match layout.component_axis {
        Some(axis) if axis != 0 => axis,
        _ => return values,
    };
    let sizes = &layout.sizes;
    let mut strides = [0usize; 4];
    let mut stride = 1usize;
    for (index, size) in sizes.iter().enumerate() {
        strides[index] = stride;
        stride *= size;
    }
    let spatial: Vec<usize> = (0..4).filter(|index| *index != axis).collect();
    let mut out = Vec::with_capacity(values.len());
    for k in 0..sizes[spatial[2]] {
        for j in 0..sizes[spatial[1]] {
            for i in 0..sizes[spatial[0]] {
                for c in 0..sizes[axis] {
                    let source = c * strides[axis]
                        + i * strides[spatial[0]]
                        + j * strides[spatial[1]]
                        + k * strides[spatial[2]];
                    out.push(values[source]);
                }
            }
        }
    }
    out
}

/// Reads one NRRD file into voxels, geometry and header key/values.
pub fn read_nrrd(request: &ReadRequest, progress: &mut dyn FnMut(f64)) -> NrrdResult<LoadedVolume> {
    progress(0.0);
    let bytes = std::fs::read(&request.path)?;
    let (header_text, data_offset) = split_header(&bytes);
    let header = parse_header(&header_text)?;

    let content = header.content_kind_for(request.storage);
    if !is_compatible(content, request.kind) {
        return Err(NrrdError::Unsupported(format!(
            "{} content cannot be read as {}",
            content.as_str(),
            request.kind.as_str()
        )));
    }

    let scalar_type = parse_scalar_type(header.require("type")?)?;
    let layout = layout(&header)?;
    if content.is_scalar_like() && layout.components != 1 {
        return Err(NrrdError::Unsupported(format!(
            "{} components for scalar content",
            layout.components
        )));
    }
    let encoding = match header.require("encoding")? {
        "ascii" | "text" | "txt" => Encoding::Ascii,
        "raw" => Encoding::Raw,
        other => return Err(NrrdError::Unsupported(format!("encoding `{other}`"))),
    };
    let endian = match header.field("endian") {
        Some("big") => Endian::Big,
        _ => Endian::Little,
    };
    progress(0.25);

    let detached;
    let data: &[u8] = match header
        .field("data file")
        .or_else(|| header.field("datafile"))
    {
        Some(file) => {
            if file.starts_with("LIST") || file.contains('%') {
                return Err(NrrdError::Unsupported(format!("data file `{file}`")));
            }
            let base = request.path.parent().unwrap_or_else(|| Path::new("."));
            detached = std::fs::read(base.join(file))?;
            &detached
        }
        None => &bytes[data_offset..],
    };

    let count = layout.count;
    let values = match encoding {
        Encoding::Ascii => decode_ascii(data, count)?,
        Encoding::Raw => decode_raw(data, count, scalar_type, endian)?,
    };
    progress(0.75);

    let (spacing, mut directions, mut origin) = geometry(&header)?;
    if !request.use_orientation_from_file {
        directions = IDENTITY_DIRECTIONS;
    }
    if request.center_image {
        origin = centered_origin(spacing, directions, layout.dimensions);
    }

    let image = ImageData {
        dimensions: layout.dimensions,
        scalar_type,
        components: layout.components,
        scalars: reorder_components(values, &layout),
    };
    progress(1.0);
    Ok(LoadedVolume {
        image,
        spacing,
        origin,
        directions,
        attributes: header.key_values,
    })
}

/// Writes an attached ASCII NRRD in RAS space.
pub fn write_nrrd(request: &WriteRequest<'_>) -> NrrdResult<()> {
    let volume = request.volume;
    let image = volume
        .image
        .as_ref()
        .ok_or_else(|| NrrdError::Data("volume has no image data".to_string()))?;
    let vector_axis = image.components > 1 || !volume.kind.is_scalar_like();

    let mut out = String::from("NRRD0004\n");
    let _ = writeln!(out, "type: {}", scalar_type_name(image.scalar_type));
    let _ = writeln!(out, "dimension: {}", if vector_axis { 4 } else { 3 });
    out.push_str("space: right-anterior-superior\n");
    let [ni, nj, nk] = image.dimensions;
    if vector_axis {
        let _ = writeln!(out, "sizes: {} {ni} {nj} {nk}", image.components);
    } else {
        let _ = writeln!(out, "sizes: {ni} {nj} {nk}");
    }

    let mut directions = String::new();
    if vector_axis {
        directions.push_str("none ");
    }
    for axis in 0..3 {
        let s = volume.spacing[axis];
        let d = &volume.directions;
        let _ = write!(
            directions,
            "({},{},{}) ",
            d[0][axis] * s,
            d[1][axis] * s,
            d[2][axis] * s
        );
    }
    let _ = writeln!(out, "space directions: {}", directions.trim_end());

    let component_kind = match volume.kind {
        VolumeKind::DiffusionTensor => "3D-symmetric-matrix",
        VolumeKind::DiffusionWeighted => "list",
        _ => "vector",
    };
    if vector_axis {
        let _ = writeln!(out, "kinds: {component_kind} domain domain domain");
    } else {
        out.push_str("kinds: domain domain domain\n");
    }
    out.push_str("encoding: ascii\n");
    let [ox, oy, oz] = volume.origin;
    let _ = writeln!(out, "space origin: ({ox},{oy},{oz})");
    for (key, value) in request.attributes {
        if key.starts_with("DWMRI_") || key.starts_with("NRRD_") {
            let _ = writeln!(out, "{key}:={value}");
        }
    }
    out.push('\n');

    let integral = !matches!(image.scalar_type, ScalarType::Float | ScalarType::Double);
    let per_line = image.components.max(1);
    for voxel in image.scalars.chunks(per_line) {
        let line: Vec<String> = voxel
            .iter()
            .map(|value| {
                if integral {
                    format!("{}", value.round() as i64)
                } else {
                    format!("{value}")
                }
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }

    std::fs::write(request.path, out)?;
    Ok(())
}

/// NRRD implementation of `VolumeIo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NrrdVolumeIo;

impl NrrdVolumeIo {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeIo for NrrdVolumeIo {
    fn name(&self) -> &str {
        "nrrd"
    }

    fn read(
        &self,
        request: &ReadRequest,
        progress: &mut dyn FnMut(f64),
    ) -> Result<LoadedVolume, String> {
        read_nrrd(request, progress).map_err(|err| format!("{}: {err}", request.path.display()))
    }

    fn write(&self, request: &WriteRequest<'_>) -> Result<(), String> {
        write_nrrd(request).map_err(|err| format!("{}: {err}", request.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::{layout, parse_header, split_header, split_vectors, NrrdError};
    use crate::model::volume::VolumeKind;

    #[test]
    fn split_header_stops_at_blank_line() {
        let bytes = b"NRRD0004\r\ntype: short\r\n\r\n1 2 3";
        let (header, offset) = split_header(bytes);
        assert_eq!(header, "NRRD0004\ntype: short");
        assert_eq!(&bytes[offset..], b"1 2 3");
    }

    #[test]
    fn classifies_content_from_kinds_and_keys() {
        let tensor = parse_header("NRRD0005\nkinds: 3D-masked-symmetric-matrix domain domain domain")
            .expect("header");
        assert_eq!(tensor.content_kind(), VolumeKind::DiffusionTensor);

        let dwi = parse_header("NRRD0005\nkinds: domain domain domain list\nDWMRI_gradient_0000:=0 0 0")
            .expect("header");
        assert_eq!(dwi.content_kind(), VolumeKind::DiffusionWeighted);

        let rgb = parse_header("NRRD0004\nkinds: RGB-color domain domain domain").expect("header");
        assert_eq!(rgb.content_kind(), VolumeKind::Vector);

        let scalar = parse_header("NRRD0004\nkinds: domain domain domain").expect("header");
        assert_eq!(scalar.content_kind(), VolumeKind::Scalar);
    }

    #[test]
    fn oversized_sizes_are_a_header_error() {
        let header = parse_header(
            "NRRD0004\ndimension: 3\nsizes: 4294967296 4294967296 4294967296",
        )
        .expect("header");
        let err = layout(&header).err().expect("sizes overflow");
        assert!(matches!(&err, NrrdError::Header(message) if message == "sizes overflow"));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = parse_header("PNG\ntype: short").expect_err("bad magic");
        assert!(matches!(err, NrrdError::Header(_)));
    }

    #[test]
    fn splits_direction_lists_with_none() {
        let vectors = split_vectors("none (1,0,0) (0,2,0) (0,0,3.5)").expect("vectors");
        assert_eq!(vectors.len(), 4);
        assert!(vectors[0].is_none());
        assert_eq!(vectors[3], Some([0.0, 0.0, 3.5]));
    }
}
