//! Corner and camera-parameter persistence.
//!
//! Both stores are XML documents. The corner store nests one element per
//! image and per corner:
//!
//! ```text
//! <Corners_Storage>
//!   <image1>
//!     <node1><data>ox</data><data>oy</data><data>oz</data><data>ix</data><data>iy</data></node1>
//!     ...
//! ```
//!
//! The parameter store uses the OpenCV `FileStorage` matrix layout:
//!
//! ```text
//! <opencv_storage>
//!   <matrix_left type_id="opencv-matrix"><rows>3</rows><cols>3</cols><dt>d</dt><data>9 values</data></matrix_left>
//!   <distortion_left type_id="opencv-matrix"><rows>5</rows><cols>1</cols><dt>d</dt><data>k1 k2 p1 p2 k3</data></distortion_left>
//! </opencv_storage>
//! ```
//!
//! Matrices written as one `<data>` child per value are read as well.
//! Corner values are written with the shortest `f32` text that parses back
//! to the same bits.

use camera_calib_core::{CorrespondenceSet, ImagePoint, ObjectPoint};
use camera_calib_solver::{CameraParams, Distortion};
use log::debug;
use nalgebra::{Matrix3, Point2, Point3};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::{
    fmt::Display,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

const CORNERS_ROOT: &str = "Corners_Storage";
const PARAMS_ROOT: &str = "opencv_storage";
const MATRIX_KEY: &str = "matrix_left";
const DISTORTION_KEY: &str = "distortion_left";
const TYPE_ID: &str = "opencv-matrix";
const DATA: &str = "data";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error("malformed store: {0}")]
    Format(String),
}

fn format_err(msg: impl Into<String>) -> StoreError {
    StoreError::Format(msg.into())
}

/// Element tree of a parsed store. Attributes are dropped.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Element, StoreError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| format_err(format!("`{}` has no `{name}`", self.name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn parse(raw: &str) -> Result<Element, StoreError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element {
        name: "document".to_string(),
        ..Element::default()
    }];
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element::named(&e)),
            Event::Empty(e) => {
                let el = Element::named(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(el);
                }
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| format_err("unbalanced end tag"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| format_err("unbalanced end tag"))?;
                parent.children.push(el);
            }
            Event::Text(t) => {
                let text = t.decode().map_err(quick_xml::Error::from)?;
                if let Some(el) = stack.last_mut() {
                    el.text.push_str(&text);
                }
            }
            Event::GeneralRef(_) => return Err(format_err("entity references are not supported")),
            Event::Eof => break,
            _ => {}
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(doc), true) => Ok(doc),
        _ => Err(format_err("document ends inside an element")),
    }
}

fn values<T: FromStr>(el: &Element, what: &str) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for data in el.children_named(DATA) {
        for token in data.text.split_whitespace() {
            let v = token
                .parse()
                .map_err(|_| format_err(format!("`{what}` holds non-numeric value `{token}`")))?;
            out.push(v);
        }
    }
    Ok(out)
}

fn exact<T>(vals: Vec<T>, expected: usize, what: &str) -> Result<Vec<T>, StoreError> {
    if vals.len() != expected {
        return Err(format_err(format!(
            "`{what}` has {} values, expected {expected}",
            vals.len()
        )));
    }
    Ok(vals)
}

fn write_decl<W: Write>(w: &mut Writer<W>) -> io::Result<()> {
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
}

fn write_data<W: Write, T: Display>(w: &mut Writer<W>, v: T) -> io::Result<()> {
    w.create_element(DATA)
        .write_text_content(BytesText::new(&v.to_string()))?;
    Ok(())
}

/// Detected corners of every accepted image, together with the board points
/// they pair with.
#[derive(Clone, Debug)]
pub struct CornerStore {
    path: PathBuf,
}

impl CornerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn to_xml(set: &CorrespondenceSet) -> Result<String, StoreError> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_decl(&mut w)?;
        w.create_element(CORNERS_ROOT).write_inner_content(|w| {
            for view in set.views() {
                w.create_element(format!("image{}", view.index + 1))
                    .write_inner_content(|w| {
                        for (k, (o, i)) in view.object.iter().zip(view.image).enumerate() {
                            w.create_element(format!("node{}", k + 1))
                                .write_inner_content(|w| {
                                    for v in [o.x, o.y, o.z, i.x, i.y] {
                                        write_data(w, v)?;
                                    }
                                    Ok(())
                                })?;
                        }
                        Ok(())
                    })?;
            }
            Ok(())
        })?;
        String::from_utf8(w.into_inner()).map_err(|e| format_err(e.to_string()))
    }

    /// Parse a document holding exactly `n_images` images of
    /// `points_per_image` nodes each.
    pub fn from_xml(
        raw: &str,
        points_per_image: usize,
        n_images: usize,
    ) -> Result<CorrespondenceSet, StoreError> {
        let doc = parse(raw)?;
        let images = doc.child(CORNERS_ROOT)?;
        if images.children.len() != n_images {
            return Err(format_err(format!(
                "`{CORNERS_ROOT}` holds {} images, expected {n_images}",
                images.children.len()
            )));
        }

        let mut set = CorrespondenceSet::new(points_per_image, n_images);
        let mut object_pts: Vec<ObjectPoint> = Vec::with_capacity(points_per_image);
        let mut image_pts: Vec<ImagePoint> = Vec::with_capacity(points_per_image);
        for i in 1..=n_images {
            let nodes = images.child(&format!("image{i}"))?;
            if nodes.children.len() != points_per_image {
                return Err(format_err(format!(
                    "`{}` holds {} nodes, expected {points_per_image}",
                    nodes.name,
                    nodes.children.len()
                )));
            }

            object_pts.clear();
            image_pts.clear();
            for k in 1..=points_per_image {
                let node = nodes.child(&format!("node{k}"))?;
                let d = exact(values::<f32>(node, &node.name)?, 5, &node.name)?;
                object_pts.push(Point3::new(d[0], d[1], d[2]));
                image_pts.push(Point2::new(d[3], d[4]));
            }
            set.push(&object_pts, &image_pts)
                .map_err(|e| format_err(e.to_string()))?;
        }
        Ok(set)
    }

    pub fn save(&self, set: &CorrespondenceSet) -> Result<(), StoreError> {
        fs::write(&self.path, Self::to_xml(set)?)?;
        debug!("wrote {} images to {}", set.len(), self.path.display());
        Ok(())
    }

    pub fn load(&self, points_per_image: usize, n_images: usize) -> Result<CorrespondenceSet, StoreError> {
        let raw = fs::read_to_string(&self.path)?;
        Self::from_xml(&raw, points_per_image, n_images)
    }
}

/// Camera matrix and distortion coefficients.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    path: PathBuf,
}

fn write_matrix<W: Write>(w: &mut Writer<W>, key: &str, rows: usize, cols: usize, data: &[f64]) -> io::Result<()> {
    w.create_element(key)
        .with_attribute(("type_id", TYPE_ID))
        .write_inner_content(|w| {
            w.create_element("rows")
                .write_text_content(BytesText::new(&rows.to_string()))?;
            w.create_element("cols")
                .write_text_content(BytesText::new(&cols.to_string()))?;
            w.create_element("dt").write_text_content(BytesText::new("d"))?;
            let text = data.iter().map(f64::to_string).collect::<Vec<_>>().join(" ");
            write_data(w, text)
        })?;
    Ok(())
}

/// Values of an OpenCV matrix element. When `rows`/`cols` are present they
/// must agree with the value count.
fn read_matrix(storage: &Element, key: &str, expected: usize) -> Result<Vec<f64>, StoreError> {
    let el = storage.child(key)?;
    let vals = exact(values::<f64>(el, key)?, expected, key)?;
    if let (Ok(rows), Ok(cols)) = (el.child("rows"), el.child("cols")) {
        let dims = (rows.text.trim().parse::<usize>(), cols.text.trim().parse::<usize>());
        match dims {
            (Ok(r), Ok(c)) if r * c == expected => {}
            _ => {
                return Err(format_err(format!(
                    "`{key}` is declared {}x{}, expected {expected} values",
                    rows.text.trim(),
                    cols.text.trim()
                )))
            }
        }
    }
    Ok(vals)
}

impl ParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn to_xml(camera: &CameraParams) -> Result<String, StoreError> {
        let k = camera.matrix();
        let mut row_major = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                row_major.push(k[(r, c)]);
            }
        }

        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_decl(&mut w)?;
        w.create_element(PARAMS_ROOT).write_inner_content(|w| {
            write_matrix(w, MATRIX_KEY, 3, 3, &row_major)?;
            write_matrix(w, DISTORTION_KEY, 5, 1, &camera.distortion.to_array())
        })?;
        String::from_utf8(w.into_inner()).map_err(|e| format_err(e.to_string()))
    }

    /// Parse a parameter document. The camera matrix must have zero skew and
    /// a `(0, 0, 1)` bottom row.
    pub fn from_xml(raw: &str) -> Result<CameraParams, StoreError> {
        let doc = parse(raw)?;
        let storage = doc.child(PARAMS_ROOT)?;
        let k = read_matrix(storage, MATRIX_KEY, 9)?;
        let d = read_matrix(storage, DISTORTION_KEY, 5)?;

        if k[1] != 0.0 || k[3] != 0.0 {
            return Err(format_err(format!(
                "`{MATRIX_KEY}` has off-diagonal focal terms ({}, {})",
                k[1], k[3]
            )));
        }
        if k[6..] != [0.0, 0.0, 1.0] {
            return Err(format_err(format!(
                "`{MATRIX_KEY}` bottom row is {:?}, expected [0, 0, 1]",
                &k[6..]
            )));
        }

        let camera = CameraParams::from_matrix(
            &Matrix3::from_row_slice(&k),
            Distortion::from_array([d[0], d[1], d[2], d[3], d[4]]),
        );
        if !camera.is_valid() {
            return Err(format_err("camera matrix has non-positive focal length"));
        }
        Ok(camera)
    }

    pub fn save(&self, camera: &CameraParams) -> Result<(), StoreError> {
        fs::write(&self.path, Self::to_xml(camera)?)?;
        debug!("wrote camera parameters to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<CameraParams, StoreError> {
        let raw = fs::read_to_string(&self.path)?;
        Self::from_xml(&raw)
    }
}
