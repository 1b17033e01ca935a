use crate::store::{format_timestamp, GraphStore};
use latmesh_model::NodeLinkFile;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphIoError {
    #[error("Graph not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("{} is a directory", .0.display())]
    IsDirectory(PathBuf),
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse graph {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl GraphIoError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Gexf,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Gexf => "gexf",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = GraphIoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gexf" => Ok(ExportFormat::Gexf),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(GraphIoError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Map a graph path or save base to the node-link JSON file behind it.
///
/// An existing path is used as-is, a `.json` path is kept even when missing,
/// anything else gets `.json` appended. Directories are rejected.
pub fn resolve_graph_path(path_or_base: &Path) -> Result<PathBuf, GraphIoError> {
    let path = expand_home(path_or_base);
    if path.is_dir() {
        return Err(GraphIoError::IsDirectory(path));
    }
    if path.exists() || has_json_extension(&path) {
        return Ok(path);
    }
    Ok(append_extension(&path, "json"))
}

/// Load a graph, or start an empty one when nothing has been saved yet.
pub fn load_graph(path_or_base: &Path) -> Result<GraphStore, GraphIoError> {
    let path = resolve_graph_path(path_or_base)?;
    if !path.exists() {
        return Ok(GraphStore::new());
    }

    let contents = fs::read_to_string(&path).map_err(|err| GraphIoError::io(&path, err))?;
    let file: NodeLinkFile =
        serde_json::from_str(&contents).map_err(|source| GraphIoError::Json {
            path: path.clone(),
            source,
        })?;
    let graph = GraphStore::from_node_link(&file);
    tracing::info!(nodes = graph.node_count(), path = %path.display(), "loaded previous session");
    Ok(graph)
}

/// Load a graph that must already exist.
pub fn load_existing_graph(path_or_base: &Path) -> Result<(PathBuf, GraphStore), GraphIoError> {
    let path = resolve_graph_path(path_or_base)?;
    if !path.exists() {
        return Err(GraphIoError::NotFound(path_or_base.to_path_buf()));
    }
    let graph = load_graph(&path)?;
    Ok((path, graph))
}

/// Write `<base>.json` (node-link) and `<base>.gexf`. Returns the JSON path.
pub fn save_graph(graph: &GraphStore, save_base: &Path) -> Result<PathBuf, GraphIoError> {
    let base = strip_json_extension(&expand_home(save_base));
    let json_path = append_extension(&base, "json");
    let gexf_path = append_extension(&base, "gexf");

    let json = serde_json::to_vec(&graph.to_node_link()).map_err(|source| GraphIoError::Json {
        path: json_path.clone(),
        source,
    })?;
    atomic_write(&json_path, &json)?;

    let mut gexf = Vec::new();
    export_gexf(graph, &mut gexf).map_err(|err| GraphIoError::io(&gexf_path, err))?;
    atomic_write(&gexf_path, &gexf)?;

    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        path = %json_path.display(),
        "graph saved"
    );
    Ok(json_path)
}

/// `source,target,weight` rows, one per edge.
pub fn export_csv<W: Write>(graph: &GraphStore, mut writer: W) -> io::Result<()> {
    writeln!(writer, "source,target,weight")?;
    for (source, target, attrs) in graph.edges() {
        let weight = attrs.weight.map(|w| w.to_string()).unwrap_or_default();
        writeln!(writer, "{},{},{}", csv_field(source), csv_field(target), weight)?;
    }
    Ok(())
}

/// GEXF 1.2 document carrying every node and edge attribute.
pub fn export_gexf<W: Write>(graph: &GraphStore, mut writer: W) -> io::Result<()> {
    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        writer,
        r#"<gexf xmlns="http://gexf.net/1.2" version="1.2">"#
    )?;
    writeln!(writer, r#"  <graph mode="static" defaultedgetype="undirected">"#)?;
    writeln!(writer, r#"    <attributes class="node" mode="static">"#)?;
    writeln!(writer, r#"      <attribute id="0" title="rtt" type="double"/>"#)?;
    writeln!(writer, r#"      <attribute id="1" title="last_seen" type="string"/>"#)?;
    writeln!(writer, "    </attributes>")?;

    writeln!(writer, "    <nodes>")?;
    for (id, attrs) in graph.nodes() {
        let id = xml_escape(id);
        writeln!(writer, r#"      <node id="{id}" label="{id}">"#)?;
        writeln!(writer, "        <attvalues>")?;
        if let Some(rtt) = attrs.rtt {
            writeln!(writer, r#"          <attvalue for="0" value="{rtt}"/>"#)?;
        }
        if let Some(seen) = attrs.last_seen {
            writeln!(
                writer,
                r#"          <attvalue for="1" value="{}"/>"#,
                format_timestamp(seen)
            )?;
        }
        writeln!(writer, "        </attvalues>")?;
        writeln!(writer, "      </node>")?;
    }
    writeln!(writer, "    </nodes>")?;

    writeln!(writer, "    <edges>")?;
    for (index, (source, target, attrs)) in graph.edges().enumerate() {
        let weight = attrs
            .weight
            .map(|w| format!(r#" weight="{w}""#))
            .unwrap_or_default();
        writeln!(
            writer,
            r#"      <edge id="{index}" source="{}" target="{}"{weight}/>"#,
            xml_escape(source),
            xml_escape(target)
        )?;
    }
    writeln!(writer, "    </edges>")?;
    writeln!(writer, "  </graph>")?;
    writeln!(writer, "</gexf>")?;
    Ok(())
}

pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), GraphIoError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).map_err(|err| GraphIoError::io(parent, err))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path).map_err(|err| GraphIoError::io(&tmp_path, err))?;
    file.write_all(data)
        .map_err(|err| GraphIoError::io(&tmp_path, err))?;
    file.sync_all()
        .map_err(|err| GraphIoError::io(&tmp_path, err))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(GraphIoError::io(path, err));
    }

    // Persist the rename itself.
    let dir = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Ok(dir) = fs::File::open(dir) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("graph");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    parent.join(format!(".{file_name}.part-{pid}-{stamp}"))
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn has_json_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn strip_json_extension(path: &Path) -> PathBuf {
    if has_json_extension(path) {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

// Appends rather than replaces, so `map.v2` becomes `map.v2.json`.
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

fn csv_field(value: &str) -> String {
    if value.contains(|c| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
