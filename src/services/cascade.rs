//! Boosted Haar cascade classifier stored in OpenCV's XML cascade format.
//!
//! Only the "new" storage layout is understood (`<cascade>` with
//! `stageType` BOOST and `featureType` HAAR). Weak classifiers may be stumps
//! or small trees. Tilted features are rejected at load time.

use image::GrayImage;
use image::imageops::{self, FilterType};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Subtracted from every stage threshold to absorb float rounding in the stored values
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

/// Windows whose normalized inverse standard deviation reaches this are treated as flat
const FLAT_WINDOW_LIMIT: f64 = 0.1;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed cascade: {0}")]
    Malformed(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

fn malformed(msg: impl Into<String>) -> CascadeError {
    CascadeError::Malformed(msg.into())
}

/// Axis-aligned rectangle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn right(&self) -> i32 {
        self.x + self.width
    }

    fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WeightedRect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    weight: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

impl HaarFeature {
    fn value(&self, integral: &IntegralImage, x: usize, y: usize) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    /// Walk the tree; non-positive child indices point at leaves (`-index`).
    fn predict(&self, feature_value: impl Fn(usize) -> f64) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let next = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            idx = next as usize;
        }
    }
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Summed-area tables for one pyramid level
pub struct IntegralImage {
    stride: usize,
    sum: Vec<i64>,
    sqsum: Vec<i64>,
}

impl IntegralImage {
    pub fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0i64; stride * (h + 1)];
        let mut sqsum = vec![0i64; stride * (h + 1)];
        let pixels = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0i64;
            let mut row_sqsum = 0i64;
            for x in 0..w {
                let v = pixels[y * w + x] as i64;
                row_sum += v;
                row_sqsum += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sqsum[idx] = sqsum[idx - stride] + row_sqsum;
            }
        }

        Self { stride, sum, sqsum }
    }

    fn area(&self, table: &[i64], x: usize, y: usize, w: usize, h: usize) -> i64 {
        let s = self.stride;
        table[(y + h) * s + x + w] - table[y * s + x + w] - table[(y + h) * s + x] + table[y * s + x]
    }

    pub fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        self.area(&self.sum, x, y, w, h)
    }

    pub fn sqsum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        self.area(&self.sqsum, x, y, w, h)
    }
}

/// A loaded cascade: fixed detection window, ordered stages, shared feature pool
#[derive(Debug, Clone)]
pub struct Cascade {
    width: usize,
    height: usize,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl Cascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml)?;
        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| malformed("missing <cascade> element"))?;

        if let Some(stage_type) = child_text(root, "stageType") {
            if stage_type != "BOOST" {
                return Err(CascadeError::Unsupported(format!("stage type {}", stage_type)));
            }
        }
        if let Some(feature_type) = child_text(root, "featureType") {
            if feature_type != "HAAR" {
                return Err(CascadeError::Unsupported(format!(
                    "feature type {}",
                    feature_type
                )));
            }
        }

        let width: usize = parse_child(root, "width")?;
        let height: usize = parse_child(root, "height")?;
        if width < 3 || height < 3 {
            return Err(malformed(format!("window {}x{} is too small", width, height)));
        }

        let features = child(root, "features")?
            .children()
            .filter(|n| n.is_element())
            .map(|n| parse_feature(n, width, height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = child(root, "stages")?
            .children()
            .filter(|n| n.is_element())
            .map(|n| parse_stage(n, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(malformed("cascade has no stages"));
        }

        Ok(Self {
            width,
            height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the window whose top-left corner is (x, y).
    ///
    /// The window must lie fully inside the integral image.
    pub fn classify_window(&self, integral: &IntegralImage, x: usize, y: usize) -> bool {
        let (nw, nh) = (self.width - 2, self.height - 2);
        let area = (nw * nh) as f64;
        let sum = integral.sum(x + 1, y + 1, nw, nh) as f64;
        let sqsum = integral.sqsum(x + 1, y + 1, nw, nh) as f64;

        let spread = area * sqsum - sum * sum;
        if spread <= 0.0 {
            return false;
        }
        let norm = 1.0 / spread.sqrt();
        if area * norm >= FLAT_WINDOW_LIMIT {
            return false;
        }

        for stage in &self.stages {
            let total: f64 = stage
                .classifiers
                .iter()
                .map(|weak| weak.predict(|fi| self.features[fi].value(integral, x, y) * norm))
                .sum();
            if total < stage.threshold {
                return false;
            }
        }
        true
    }

    /// Scan an image pyramid and return grouped detections in source image coordinates.
    pub fn detect_multi_scale(
        &self,
        image: &GrayImage,
        scale_factor: f64,
        min_neighbors: usize,
        group_eps: f64,
    ) -> Vec<Rect> {
        // A factor of 1 or less would never leave the first level
        if scale_factor <= 1.0 {
            return Vec::new();
        }

        let (img_w, img_h) = image.dimensions();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let window_w = (self.width as f64 * factor).round() as u32;
            let window_h = (self.height as f64 * factor).round() as u32;
            if window_w > img_w || window_h > img_h {
                break;
            }

            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w < self.width as u32 || scaled_h < self.height as u32 {
                break;
            }

            let resized;
            let level = if (scaled_w, scaled_h) == (img_w, img_h) {
                image
            } else {
                resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
                &resized
            };

            let integral = IntegralImage::new(level);
            let step = if factor >= 2.0 { 1 } else { 2 };
            let max_x = scaled_w as usize - self.width;
            let max_y = scaled_h as usize - self.height;

            for y in (0..=max_y).step_by(step) {
                for x in (0..=max_x).step_by(step) {
                    if self.classify_window(&integral, x, y) {
                        hits.push(Rect::new(
                            (x as f64 * factor).round() as i32,
                            (y as f64 * factor).round() as i32,
                            window_w as i32,
                            window_h as i32,
                        ));
                    }
                }
            }

            factor *= scale_factor;
        }

        group_rectangles(hits, min_neighbors, group_eps)
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| malformed(format!("missing <{}> element", name)))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn parse_child<T: std::str::FromStr>(node: Node, name: &str) -> Result<T, CascadeError> {
    let text = child_text(node, name).ok_or_else(|| malformed(format!("missing <{}>", name)))?;
    text.parse()
        .map_err(|_| malformed(format!("<{}> is not a number: {}", name, text)))
}

fn parse_numbers(text: &str, what: &str) -> Result<Vec<f64>, CascadeError> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| malformed(format!("bad number {:?} in {}", tok, what)))
        })
        .collect()
}

fn parse_feature(node: Node, win_w: usize, win_h: usize) -> Result<HaarFeature, CascadeError> {
    if child_text(node, "tilted").is_some_and(|t| t != "0") {
        return Err(CascadeError::Unsupported("tilted Haar features".into()));
    }

    let mut rects = Vec::new();
    for rect_node in child(node, "rects")?.children().filter(|n| n.is_element()) {
        let values = parse_numbers(rect_node.text().unwrap_or_default(), "feature rect")?;
        let &[x, y, w, h, weight] = values.as_slice() else {
            return Err(malformed(format!(
                "feature rect needs 5 values, got {}",
                values.len()
            )));
        };
        if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
            return Err(malformed("feature rect has negative or empty geometry"));
        }
        let rect = WeightedRect {
            x: x as usize,
            y: y as usize,
            width: w as usize,
            height: h as usize,
            weight,
        };
        if rect.x + rect.width > win_w || rect.y + rect.height > win_h {
            return Err(malformed("feature rect exceeds the detection window"));
        }
        rects.push(rect);
    }

    if rects.is_empty() {
        return Err(malformed("feature without rects"));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f64 = parse_child(node, "stageThreshold")?;

    let classifiers = child(node, "weakClassifiers")?
        .children()
        .filter(|n| n.is_element())
        .map(|n| parse_weak_classifier(n, feature_count))
        .collect::<Result<Vec<_>, _>>()?;

    if classifiers.is_empty() {
        return Err(malformed("stage without weak classifiers"));
    }

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node, feature_count: usize) -> Result<WeakClassifier, CascadeError> {
    let internal = parse_numbers(
        child_text(node, "internalNodes").unwrap_or_default(),
        "internalNodes",
    )?;
    let leaves = parse_numbers(
        child_text(node, "leafValues").unwrap_or_default(),
        "leafValues",
    )?;

    if internal.is_empty() || internal.len() % 4 != 0 {
        return Err(malformed(format!(
            "internalNodes must hold groups of 4 values, got {}",
            internal.len()
        )));
    }

    let nodes: Vec<TreeNode> = internal
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    for node in &nodes {
        if node.feature >= feature_count {
            return Err(malformed(format!("feature index {} out of range", node.feature)));
        }
        for next in [node.left, node.right] {
            let in_range = if next <= 0 {
                (next.unsigned_abs() as usize) < leaves.len()
            } else {
                (next as usize) < nodes.len()
            };
            if !in_range {
                return Err(malformed(format!("tree link {} out of range", next)));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

/// Cluster raw hits and keep the clusters supported by more than `min_neighbors` hits.
///
/// Hits are similar when every edge differs by at most `eps` times the mean of
/// the smaller width and height. Each surviving cluster is replaced by its
/// average rectangle, and a cluster nested inside a stronger one is dropped.
pub fn group_rectangles(rects: Vec<Rect>, min_neighbors: usize, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects;
    }

    let (labels, class_count) = partition(&rects, eps);

    let mut sums = vec![[0i64; 4]; class_count];
    let mut counts = vec![0usize; class_count];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let avg = |v: i64| (v as f64 / n as f64).round() as i32;
            Rect::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }

        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if i == j || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            grouped.push(*r1);
        }
    }
    grouped
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: i32, q: i32| ((p - q).abs() as f64) <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.right(), b.right()) && close(a.bottom(), b.bottom())
}

/// Union-find over the similarity relation; returns (label per rect, label count).
fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut label_of_root = HashMap::new();
    let labels = (0..rects.len())
        .map(|i| {
            let root = find(&mut parent, i);
            let next = label_of_root.len();
            *label_of_root.entry(root).or_insert(next)
        })
        .collect();
    (labels, label_of_root.len())
}
