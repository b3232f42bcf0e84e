//! Legacy VTK PolyData reading and writing.
//!
//! The upstream SPH solver emits its per-frame particle snapshots as legacy
//! (non-XML) VTK PolyData, and the engine writes its own snapshots in the
//! same format, so a small self-contained codec covers both directions.
//! Both ASCII and binary (big-endian, per the VTK standard) encodings are
//! supported on read; the writer picks the encoding per call.
//!
//! Only the subset of the format that particle snapshots use is handled:
//! POINTS, VERTICES (skipped on read), POINT_DATA with SCALARS / VECTORS /
//! FIELD arrays.

use std::fs;
use std::io::Write as _;

use glam::DVec3;
use kernel::FluidFrame;

/// Array payload: interleaved tuples of `components` values each.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Floating-point tuples, written as `double`.
    Float {
        /// Values per tuple.
        components: usize,
        /// `components * tuples` interleaved values.
        values: Vec<f64>,
    },
    /// Integer tuples, written as `long`.
    Int {
        /// Values per tuple.
        components: usize,
        /// `components * tuples` interleaved values.
        values: Vec<i64>,
    },
}

impl ArrayData {
    fn tuples(&self) -> usize {
        match self {
            ArrayData::Float { components, values } => values.len() / components,
            ArrayData::Int { components, values } => values.len() / components,
        }
    }
}

/// A named point-data array.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    /// Array name as it appears in the file.
    pub name: String,
    /// The payload.
    pub data: ArrayData,
}

/// An in-memory PolyData point cloud.
///
/// `scalars` maps onto the file's SCALARS section (the "active" scalar
/// attribute), `fields` onto a FIELD block -- mirroring how the engine's
/// snapshots are laid out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyData {
    /// Point positions.
    pub points: Vec<DVec3>,
    /// Active scalar attribute, if any.
    pub scalars: Option<DataArray>,
    /// Additional named arrays.
    pub fields: Vec<DataArray>,
}

impl PolyData {
    /// Look up a point-data array by any of the candidate names.
    pub fn find(&self, names: &[&str]) -> Option<&DataArray> {
        self.scalars
            .iter()
            .chain(self.fields.iter())
            .find(|a| names.iter().any(|n| a.name == *n))
    }
}

/// Output encoding for [`write_polydata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Whitespace-separated text values.
    Ascii,
    /// Big-endian raw values (the VTK binary convention).
    Binary,
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct Reader {
    bytes: Vec<u8>,
    cur: usize,
    binary: bool,
}

impl Reader {
    /// Next raw line, without skipping anything.
    fn raw_line(&mut self) -> Result<String, String> {
        if self.cur >= self.bytes.len() {
            return Err("unexpected end of file".to_string());
        }
        let start = self.cur;
        while self.cur < self.bytes.len() && self.bytes[self.cur] != b'\n' {
            self.cur += 1;
        }
        let mut end = self.cur;
        if end > start && self.bytes[end - 1] == b'\r' {
            end -= 1;
        }
        if self.cur < self.bytes.len() {
            self.cur += 1; // consume the newline
        }
        String::from_utf8(self.bytes[start..end].to_vec())
            .map_err(|_| "non-UTF8 header line".to_string())
    }

    /// Next non-blank line, skipping leading whitespace.
    fn line(&mut self) -> Result<String, String> {
        loop {
            let line = self.raw_line()?;
            if !line.trim().is_empty() {
                return Ok(line.trim().to_string());
            }
        }
    }

    fn at_end(&mut self) -> bool {
        while self.cur < self.bytes.len() && self.bytes[self.cur].is_ascii_whitespace() {
            self.cur += 1;
        }
        self.cur >= self.bytes.len()
    }

    /// Next whitespace-delimited ASCII token (may cross line breaks).
    fn token(&mut self) -> Result<&str, String> {
        while self.cur < self.bytes.len() && self.bytes[self.cur].is_ascii_whitespace() {
            self.cur += 1;
        }
        if self.cur >= self.bytes.len() {
            return Err("unexpected end of file in data section".to_string());
        }
        let start = self.cur;
        while self.cur < self.bytes.len() && !self.bytes[self.cur].is_ascii_whitespace() {
            self.cur += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.cur])
            .map_err(|_| "non-UTF8 token".to_string())
    }

    fn take(&mut self, n: usize) -> Result<&[u8], String> {
        if self.cur + n > self.bytes.len() {
            return Err("unexpected end of file in binary data".to_string());
        }
        let slice = &self.bytes[self.cur..self.cur + n];
        self.cur += n;
        Ok(slice)
    }

    /// Read `count` values of the given VTK type as f64.
    fn floats(&mut self, count: usize, ty: &str) -> Result<Vec<f64>, String> {
        if self.binary {
            let mut out = Vec::with_capacity(count);
            match ty {
                "float" => {
                    let raw = self.take(4 * count)?;
                    for c in raw.chunks_exact(4) {
                        out.push(f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64);
                    }
                }
                "double" => {
                    let raw = self.take(8 * count)?;
                    for c in raw.chunks_exact(8) {
                        out.push(f64::from_be_bytes([
                            c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                        ]));
                    }
                }
                other => return Err(format!("unsupported float type '{other}'")),
            }
            Ok(out)
        } else {
            (0..count)
                .map(|_| {
                    let tok = self.token()?;
                    tok.parse::<f64>()
                        .map_err(|_| format!("bad float value '{tok}'"))
                })
                .collect()
        }
    }

    /// Read `count` values of the given VTK type as i64.
    fn ints(&mut self, count: usize, ty: &str) -> Result<Vec<i64>, String> {
        if self.binary {
            let mut out = Vec::with_capacity(count);
            match ty {
                "char" | "unsigned_char" => {
                    let raw = self.take(count)?;
                    out.extend(raw.iter().map(|&b| b as i64));
                }
                "short" => {
                    let raw = self.take(2 * count)?;
                    for c in raw.chunks_exact(2) {
                        out.push(i16::from_be_bytes([c[0], c[1]]) as i64);
                    }
                }
                "int" => {
                    let raw = self.take(4 * count)?;
                    for c in raw.chunks_exact(4) {
                        out.push(i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as i64);
                    }
                }
                "unsigned_int" => {
                    let raw = self.take(4 * count)?;
                    for c in raw.chunks_exact(4) {
                        out.push(u32::from_be_bytes([c[0], c[1], c[2], c[3]]) as i64);
                    }
                }
                "long" | "unsigned_long" | "vtktypeint64" => {
                    let raw = self.take(8 * count)?;
                    for c in raw.chunks_exact(8) {
                        out.push(i64::from_be_bytes([
                            c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                        ]));
                    }
                }
                other => return Err(format!("unsupported integer type '{other}'")),
            }
            Ok(out)
        } else {
            (0..count)
                .map(|_| {
                    let tok = self.token()?;
                    tok.parse::<i64>()
                        .map_err(|_| format!("bad integer value '{tok}'"))
                })
                .collect()
        }
    }
}

fn is_float_type(ty: &str) -> bool {
    matches!(ty, "float" | "double")
}

/// Read a legacy VTK PolyData file.
pub fn read_polydata(path: &str) -> Result<PolyData, String> {
    let bytes = fs::read(path).map_err(|e| format!("Failed to read {path}: {e}"))?;
    let mut r = Reader {
        bytes,
        cur: 0,
        binary: false,
    };

    let magic = r.raw_line()?;
    if !magic.starts_with("# vtk DataFile") {
        return Err(format!("{path}: not a VTK legacy file"));
    }
    let _title = r.raw_line()?;
    match r.line()?.as_str() {
        "ASCII" => r.binary = false,
        "BINARY" => r.binary = true,
        other => return Err(format!("{path}: unknown encoding '{other}'")),
    }
    let dataset = r.line()?;
    if dataset != "DATASET POLYDATA" {
        return Err(format!("{path}: expected POLYDATA, got '{dataset}'"));
    }

    let mut poly = PolyData::default();
    let mut in_point_data = true;

    while !r.at_end() {
        let header = r.line()?;
        let mut words = header.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();
        match keyword.as_str() {
            "POINTS" => {
                let n: usize = parse_field(words.next(), "POINTS count")?;
                let ty = words.next().ok_or("POINTS missing type")?.to_lowercase();
                let values = r.floats(3 * n, &ty)?;
                poly.points = values
                    .chunks_exact(3)
                    .map(|c| DVec3::new(c[0], c[1], c[2]))
                    .collect();
            }
            "VERTICES" | "LINES" | "POLYGONS" | "TRIANGLE_STRIPS" => {
                let _n: usize = parse_field(words.next(), "cell count")?;
                let size: usize = parse_field(words.next(), "cell list size")?;
                // Connectivity is implicit for point clouds; discard it.
                let _ = r.ints(size, "int")?;
            }
            "POINT_DATA" => {
                in_point_data = true;
            }
            "CELL_DATA" => {
                in_point_data = false;
            }
            "SCALARS" => {
                let name = words.next().ok_or("SCALARS missing name")?.to_string();
                let ty = words.next().ok_or("SCALARS missing type")?.to_lowercase();
                let components: usize = match words.next() {
                    Some(v) => parse_field(Some(v), "SCALARS components")?,
                    None => 1,
                };
                let lut = r.line()?;
                if !lut.to_ascii_uppercase().starts_with("LOOKUP_TABLE") {
                    return Err(format!("{path}: SCALARS without LOOKUP_TABLE"));
                }
                let count = components * poly.points.len();
                let data = if is_float_type(&ty) {
                    ArrayData::Float {
                        components,
                        values: r.floats(count, &ty)?,
                    }
                } else {
                    ArrayData::Int {
                        components,
                        values: r.ints(count, &ty)?,
                    }
                };
                if in_point_data {
                    poly.scalars = Some(DataArray { name, data });
                }
            }
            "VECTORS" => {
                let name = words.next().ok_or("VECTORS missing name")?.to_string();
                let ty = words.next().ok_or("VECTORS missing type")?.to_lowercase();
                let values = r.floats(3 * poly.points.len(), &ty)?;
                if in_point_data {
                    poly.fields.push(DataArray {
                        name,
                        data: ArrayData::Float {
                            components: 3,
                            values,
                        },
                    });
                }
            }
            "FIELD" => {
                let _name = words.next();
                let count: usize = parse_field(words.next(), "FIELD array count")?;
                for _ in 0..count {
                    let spec = r.line()?;
                    let mut w = spec.split_whitespace();
                    let name = w.next().ok_or("FIELD array missing name")?.to_string();
                    let components: usize = parse_field(w.next(), "FIELD components")?;
                    let tuples: usize = parse_field(w.next(), "FIELD tuples")?;
                    let ty = w.next().ok_or("FIELD array missing type")?.to_lowercase();
                    let total = components * tuples;
                    let data = if is_float_type(&ty) {
                        ArrayData::Float {
                            components,
                            values: r.floats(total, &ty)?,
                        }
                    } else {
                        ArrayData::Int {
                            components,
                            values: r.ints(total, &ty)?,
                        }
                    };
                    if in_point_data {
                        poly.fields.push(DataArray { name, data });
                    }
                }
            }
            other => {
                return Err(format!("{path}: unsupported section '{other}'"));
            }
        }
    }

    Ok(poly)
}

fn parse_field<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    word.ok_or(format!("missing {what}"))?
        .parse::<T>()
        .map_err(|_| format!("bad {what}"))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a PolyData point cloud with one VERTEX cell per point.
pub fn write_polydata(
    path: &str,
    poly: &PolyData,
    format: FileFormat,
) -> Result<(), String> {
    let mut out: Vec<u8> = Vec::new();
    let n = poly.points.len();
    let binary = format == FileFormat::Binary;

    let _ = writeln!(out, "# vtk DataFile Version 3.0");
    let _ = writeln!(out, "diffuse particle snapshot");
    let _ = writeln!(out, "{}", if binary { "BINARY" } else { "ASCII" });
    let _ = writeln!(out, "DATASET POLYDATA");

    let _ = writeln!(out, "POINTS {n} double");
    if binary {
        for p in &poly.points {
            out.extend_from_slice(&p.x.to_be_bytes());
            out.extend_from_slice(&p.y.to_be_bytes());
            out.extend_from_slice(&p.z.to_be_bytes());
        }
        out.push(b'\n');
    } else {
        for p in &poly.points {
            let _ = writeln!(out, "{} {} {}", p.x, p.y, p.z);
        }
    }

    let _ = writeln!(out, "VERTICES {n} {}", 2 * n);
    if binary {
        for i in 0..n {
            out.extend_from_slice(&1i32.to_be_bytes());
            out.extend_from_slice(&(i as i32).to_be_bytes());
        }
        out.push(b'\n');
    } else {
        for i in 0..n {
            let _ = writeln!(out, "1 {i}");
        }
    }

    if poly.scalars.is_some() || !poly.fields.is_empty() {
        let _ = writeln!(out, "POINT_DATA {n}");
    }

    if let Some(scalars) = &poly.scalars {
        match &scalars.data {
            ArrayData::Float { components, values } => {
                let _ = writeln!(out, "SCALARS {} double {components}", scalars.name);
                let _ = writeln!(out, "LOOKUP_TABLE default");
                write_floats(&mut out, values, binary);
            }
            ArrayData::Int { components, values } => {
                let _ = writeln!(out, "SCALARS {} long {components}", scalars.name);
                let _ = writeln!(out, "LOOKUP_TABLE default");
                write_ints(&mut out, values, binary);
            }
        }
    }

    if !poly.fields.is_empty() {
        let _ = writeln!(out, "FIELD FieldData {}", poly.fields.len());
        for array in &poly.fields {
            match &array.data {
                ArrayData::Float { components, values } => {
                    let _ = writeln!(
                        out,
                        "{} {components} {} double",
                        array.name,
                        array.data.tuples()
                    );
                    write_floats(&mut out, values, binary);
                }
                ArrayData::Int { components, values } => {
                    let _ = writeln!(
                        out,
                        "{} {components} {} long",
                        array.name,
                        array.data.tuples()
                    );
                    write_ints(&mut out, values, binary);
                }
            }
        }
    }

    fs::write(path, out).map_err(|e| format!("Failed to write {path}: {e}"))
}

fn write_floats(out: &mut Vec<u8>, values: &[f64], binary: bool) {
    if binary {
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.push(b'\n');
    } else {
        for v in values {
            let _ = writeln!(out, "{v}");
        }
    }
}

fn write_ints(out: &mut Vec<u8>, values: &[i64], binary: bool) {
    if binary {
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.push(b'\n');
    } else {
        for v in values {
            let _ = writeln!(out, "{v}");
        }
    }
}

// ---------------------------------------------------------------------------
// Fluid snapshot loading
// ---------------------------------------------------------------------------

/// Load one upstream fluid snapshot into a [`FluidFrame`].
///
/// The file must carry a 3-component velocity array (`Vel` or `Velocity`)
/// and a scalar density array (`Rhop` or `Density`). A missing file or a
/// snapshot without those arrays is an error; the driver treats it as
/// end-of-input.
pub fn load_fluid_frame(path: &str) -> Result<FluidFrame, String> {
    let poly = read_polydata(path)?;
    let n = poly.points.len();

    let vel = match poly.find(&["Vel", "Velocity"]) {
        Some(DataArray {
            data: ArrayData::Float { components: 3, values },
            ..
        }) if values.len() == 3 * n => values
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect::<Vec<_>>(),
        _ => return Err(format!("{path}: missing 3-component velocity array")),
    };

    let rhop = match poly.find(&["Rhop", "Density"]) {
        Some(DataArray {
            data: ArrayData::Float { components: 1, values },
            ..
        }) if values.len() == n => values.clone(),
        _ => return Err(format!("{path}: missing density array")),
    };

    let mut frame = FluidFrame::new();
    for i in 0..n {
        frame.push(poly.points[i], vel[i], rhop[i]);
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poly() -> PolyData {
        PolyData {
            points: vec![
                DVec3::new(0.125, -3.5, 2.0e-7),
                DVec3::new(1.0, 2.0, 3.0),
            ],
            scalars: Some(DataArray {
                name: "id".to_string(),
                data: ArrayData::Int {
                    components: 1,
                    values: vec![42, 43],
                },
            }),
            fields: vec![
                DataArray {
                    name: "Velocity".to_string(),
                    data: ArrayData::Float {
                        components: 3,
                        values: vec![0.1, 0.2, 0.3, -0.4, 0.5, -0.6],
                    },
                },
                DataArray {
                    name: "Density".to_string(),
                    data: ArrayData::Float {
                        components: 1,
                        values: vec![7.0, 11.0],
                    },
                },
            ],
        }
    }

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("foam_vtk_test_{}_{name}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let path = temp_path("binary.vtk");
        let poly = sample_poly();
        write_polydata(&path, &poly, FileFormat::Binary).unwrap();
        let back = read_polydata(&path).unwrap();
        assert_eq!(back, poly);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn ascii_round_trip_is_exact() {
        let path = temp_path("ascii.vtk");
        let poly = sample_poly();
        write_polydata(&path, &poly, FileFormat::Ascii).unwrap();
        let back = read_polydata(&path).unwrap();
        // Rust's shortest-representation float formatting round-trips f64.
        assert_eq!(back, poly);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_fluid_frame_maps_arrays() {
        let path = temp_path("fluid.vtk");
        let mut poly = sample_poly();
        poly.scalars = None;
        write_polydata(&path, &poly, FileFormat::Binary).unwrap();

        let frame = load_fluid_frame(&path).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.vel[0], DVec3::new(0.1, 0.2, 0.3));
        assert_eq!(frame.rhop[1], 11.0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_velocity_is_an_error() {
        let path = temp_path("novel.vtk");
        let poly = PolyData {
            points: vec![DVec3::ZERO],
            scalars: None,
            fields: vec![],
        };
        write_polydata(&path, &poly, FileFormat::Ascii).unwrap();
        assert!(load_fluid_frame(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_polydata("/nonexistent/no_such_file.vtk").is_err());
    }

    #[test]
    fn rejects_non_vtk_content() {
        let path = temp_path("garbage.vtk");
        fs::write(&path, b"hello world\n").unwrap();
        assert!(read_polydata(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
