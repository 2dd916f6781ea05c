//! Visualization generation module
//!
//! Rendering is a side channel: the clustering result never depends on it,
//! and failures here are logged rather than propagated into the run.

use crate::cluster::rebalance::RebalanceOutcome;
use crate::cluster::Partition;
use crate::graph::SimilarityGraph;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const CANVAS_SIZE: f64 = 2048.0;
const PADDING: f64 = 20.0;
const NODE_SPACING: f64 = 10.0;
const COMMUNITY_GAP: f64 = 2.0 * NODE_SPACING;
const CLIQUE_WEIGHT: f64 = 8.0;

fn golden_angle() -> f64 {
    PI * (3.0 - 5f64.sqrt())
}

/// Graph handed to the renderer: nodes carry a community label, edges a weight
#[derive(Debug, Clone)]
pub struct RenderGraph {
    pub labels: Vec<String>,
    pub communities: Vec<usize>,
    pub edges: Vec<(usize, usize, f64)>,
}

impl RenderGraph {
    /// The similarity graph colored by detected community
    pub fn from_similarity(graph: &SimilarityGraph, partition: &Partition) -> Self {
        Self {
            labels: graph.node_ids().to_vec(),
            communities: partition.labels.clone(),
            edges: graph.edges().map(|(a, b, e)| (a, b, e.weight as f64)).collect(),
        }
    }

    /// Each final cluster drawn as a clique, nodes still colored by original community
    pub fn from_rebalanced(graph: &SimilarityGraph, partition: &Partition, outcome: &RebalanceOutcome) -> Self {
        let mut edges = Vec::new();
        for cluster in &outcome.clusters {
            for (i, &a) in cluster.members.iter().enumerate() {
                for &b in &cluster.members[i + 1..] {
                    edges.push((a, b, CLIQUE_WEIGHT));
                }
            }
        }
        Self {
            labels: graph.node_ids().to_vec(),
            communities: partition.labels.clone(),
            edges,
        }
    }

    fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.labels.len()];
        for &(a, b, _) in &self.edges {
            degrees[a] += 1;
            degrees[b] += 1;
        }
        degrees
    }
}

/// Rendering state for one run: palette and memoized node sizes
#[derive(Debug, Clone)]
pub struct RenderContext {
    palette: Vec<String>,
    node_sizes: HashMap<usize, f64>,
}

impl RenderContext {
    pub fn new(community_count: usize) -> Self {
        Self {
            palette: palette(community_count.max(1)),
            node_sizes: HashMap::new(),
        }
    }

    pub fn color(&self, community: usize) -> &str {
        &self.palette[community % self.palette.len()]
    }

    /// Size from degree, fixed the first time a node is drawn in this run
    pub fn node_size(&mut self, node: usize, degree: usize) -> f64 {
        *self
            .node_sizes
            .entry(node)
            .or_insert_with(|| degree as f64 / 10.0 + 1.0)
    }
}

/// Evenly spaced, fairly saturated hues as `#rrggbb`
pub fn palette(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let hue = i as f64 / count as f64;
            let (r, g, b) = hsl_to_rgb(hue, 0.65, 0.5);
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        })
        .collect()
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |mut t: f64| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        (v * 255.0).round() as u8
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

/// Edge opacity from weight, kept within [0.3, 0.9]
pub fn edge_opacity(weight: f64) -> f64 {
    (weight / 20.0).clamp(0.3, 0.9)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStyle {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeStyle {
    pub source: usize,
    pub target: usize,
    pub size: f64,
    pub color: String,
}

/// Fully styled drawing, independent of any output format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub nodes: Vec<NodeStyle>,
    pub edges: Vec<EdgeStyle>,
}

/// Two-level circle packing: members packed on a sunflower inside their
/// community's disc, discs placed on a golden-angle spiral by decreasing size.
fn circle_pack(communities: &[usize]) -> Vec<(f64, f64)> {
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (node, &community) in communities.iter().enumerate() {
        groups.entry(community).or_default().push(node);
    }

    let mut ordered: Vec<(usize, Vec<usize>)> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

    let angle = golden_angle();
    let mut positions = vec![(0.0, 0.0); communities.len()];
    let mut packed_area = 0.0;

    for (slot, (_, members)) in ordered.iter().enumerate() {
        let radius = NODE_SPACING * (members.len() as f64 + 0.5).sqrt() + COMMUNITY_GAP;
        let distance = if slot == 0 { 0.0 } else { (packed_area / PI).sqrt() + radius };
        let theta = slot as f64 * angle;
        let (cx, cy) = (distance * theta.cos(), distance * theta.sin());
        packed_area += PI * (2.0 * radius).powi(2);

        for (k, &node) in members.iter().enumerate() {
            let r = NODE_SPACING * (k as f64 + 0.5).sqrt();
            let phi = k as f64 * angle;
            positions[node] = (cx + r * phi.cos(), cy + r * phi.sin());
        }
    }

    fit_to_canvas(&mut positions);
    positions
}

fn fit_to_canvas(positions: &mut [(f64, f64)]) {
    if positions.is_empty() {
        return;
    }
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in positions.iter() {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let usable = CANVAS_SIZE - 2.0 * PADDING;
    let extent = (max_x - min_x).max(max_y - min_y);
    let scale = if extent > 0.0 { usable / extent } else { 0.0 };
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    for position in positions.iter_mut() {
        position.0 = CANVAS_SIZE / 2.0 + (position.0 - mid_x) * scale;
        position.1 = CANVAS_SIZE / 2.0 + (position.1 - mid_y) * scale;
    }
}

/// Apply layout and style rules to a graph
pub fn build_scene(graph: &RenderGraph, context: &mut RenderContext) -> Scene {
    let positions = circle_pack(&graph.communities);
    let degrees = graph.degrees();

    let nodes = graph
        .labels
        .iter()
        .enumerate()
        .map(|(node, label)| NodeStyle {
            label: label.clone(),
            x: positions[node].0,
            y: positions[node].1,
            size: context.node_size(node, degrees[node]),
            color: context.color(graph.communities[node]).to_string(),
        })
        .collect();

    let edges = graph
        .edges
        .iter()
        .map(|&(source, target, weight)| {
            let opacity = edge_opacity(weight);
            EdgeStyle {
                source,
                target,
                size: opacity,
                color: format!("rgba(0, 0, 0, {})", opacity),
            }
        })
        .collect();

    Scene {
        width: CANVAS_SIZE,
        height: CANVAS_SIZE,
        nodes,
        edges,
    }
}

/// Turns a styled scene into a file
pub trait Renderer {
    fn extension(&self) -> &'static str;
    fn render(&self, scene: &Scene, path: &Path) -> Result<()>;
}

/// Writes the scene as an SVG image
pub struct SvgRenderer;

impl Renderer for SvgRenderer {
    fn extension(&self) -> &'static str {
        "svg"
    }

    fn render(&self, scene: &Scene, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);

        writeln!(
            file,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = scene.width,
            h = scene.height
        )?;
        writeln!(file, "  <rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>")?;

        writeln!(file, "  <g id=\"edges\">")?;
        for edge in &scene.edges {
            let (a, b) = (&scene.nodes[edge.source], &scene.nodes[edge.target]);
            writeln!(
                file,
                "    <line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"{:.2}\"/>",
                a.x, a.y, b.x, b.y, edge.color, edge.size
            )?;
        }
        writeln!(file, "  </g>")?;

        writeln!(file, "  <g id=\"nodes\">")?;
        for node in &scene.nodes {
            writeln!(
                file,
                "    <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" fill=\"{}\"><title>{}</title></circle>",
                node.x,
                node.y,
                node.size,
                node.color,
                escape_xml(&node.label)
            )?;
        }
        writeln!(file, "  </g>")?;
        writeln!(file, "</svg>")?;

        file.flush()?;
        Ok(())
    }
}

/// Writes the styled scene as JSON for an external renderer
pub struct SceneJsonRenderer;

impl Renderer for SceneJsonRenderer {
    fn extension(&self) -> &'static str {
        "scene.json"
    }

    fn render(&self, scene: &Scene, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), scene)?;
        Ok(())
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render with every renderer, logging failures instead of returning them
fn render_all(renderers: &[&dyn Renderer], scene: &Scene, dir: &Path, name: &str) {
    for renderer in renderers {
        let path = dir.join(format!("{}.{}", name, renderer.extension()));
        match renderer.render(scene, &path) {
            Ok(()) => log::info!("Rendered graph to {}", path.display()),
            Err(err) => log::warn!("Rendering {} failed: {:#}", path.display(), err),
        }
    }
}

/// Write the similarity graph as GraphML with relation, weight, and community attributes
pub fn write_graphml(graph: &SimilarityGraph, partition: &Partition, path: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);

    writeln!(file, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(file, "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">")?;
    writeln!(file, "  <key id=\"community\" for=\"node\" attr.name=\"community\" attr.type=\"int\"/>")?;
    writeln!(file, "  <key id=\"relation\" for=\"edge\" attr.name=\"relation\" attr.type=\"string\"/>")?;
    writeln!(file, "  <key id=\"weight\" for=\"edge\" attr.name=\"weight\" attr.type=\"int\"/>")?;
    writeln!(file, "  <graph id=\"G\" edgedefault=\"undirected\">")?;

    for (node, id) in graph.node_ids().iter().enumerate() {
        writeln!(
            file,
            "    <node id=\"{}\">\n      <data key=\"community\">{}</data>\n    </node>",
            escape_xml(id),
            partition.labels[node]
        )?;
    }

    for (edge_id, (a, b, edge)) in graph.edges().enumerate() {
        writeln!(
            file,
            "    <edge id=\"e{}\" source=\"{}\" target=\"{}\">\n      <data key=\"relation\">{}</data>\n      <data key=\"weight\">{}</data>\n    </edge>",
            edge_id,
            escape_xml(&graph.node_ids()[a]),
            escape_xml(&graph.node_ids()[b]),
            edge.relation,
            edge.weight
        )?;
    }

    writeln!(file, "  </graph>")?;
    writeln!(file, "</graphml>")?;
    file.flush()?;
    Ok(())
}

/// Render the similarity graph and the rebalanced clusters into `dir`.
///
/// Both drawings share one context, so a node keeps the size it was first drawn with.
pub fn generate_visualizations(dir: &Path, graph: &SimilarityGraph, partition: &Partition, outcome: &RebalanceOutcome) {
    log::info!("Generating visualizations for {} entities", graph.node_count());

    let renderers: [&dyn Renderer; 2] = [&SvgRenderer, &SceneJsonRenderer];
    let mut context = RenderContext::new(partition.len());

    let scene = build_scene(&RenderGraph::from_similarity(graph, partition), &mut context);
    render_all(&renderers, &scene, dir, "graph");

    let adjusted = build_scene(&RenderGraph::from_rebalanced(graph, partition, outcome), &mut context);
    render_all(&renderers, &adjusted, dir, "graph-adjusted");
}
