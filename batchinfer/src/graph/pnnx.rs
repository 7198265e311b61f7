//! Loader for PNNX-style `.param` / `.bin` model pairs.
//!
//! The `.param` file is line oriented:
//!
//! ```text
//! 7767517
//! <node count> <operand count>
//! <type> <name> <n_in> <n_out> <inputs...> <outputs...> key=value @attr=(shape)dtype #operand=(shape)dtype
//! ```
//!
//! The `.bin` file stores the `@attr` payloads back to back, in the order they
//! appear in the `.param` file, as little-endian values. It must hold nothing
//! else.
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use memmap2::Mmap;

use crate::graph::desc::{AttrDType, Attribute, ModelDesc, NodeDesc, OperandDesc, Parameter};

const MAGIC: &str = "7767517";

#[derive(Debug, Clone)]
pub struct ModelLoader {
    param_path: Option<PathBuf>,
    desc: ModelDesc,
}

impl ModelLoader {
    pub fn open(param_path: impl AsRef<Path>, bin_path: impl AsRef<Path>) -> Result<Self> {
        let param_path = param_path.as_ref();
        let bin_path = bin_path.as_ref();
        let text = fs::read_to_string(param_path)
            .with_context(|| format!("read param file {}", param_path.display()))?;
        let file = File::open(bin_path)
            .with_context(|| format!("open bin file {}", bin_path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat bin file {}", bin_path.display()))?
            .len();
        let desc = if len == 0 {
            parse_model(&text, &[])
        } else {
            let mmap = unsafe {
                Mmap::map(&file).with_context(|| format!("mmap bin file {}", bin_path.display()))?
            };
            parse_model(&text, &mmap[..])
        }
        .with_context(|| format!("load model {}", param_path.display()))?;
        Ok(Self {
            param_path: Some(param_path.to_path_buf()),
            desc,
        })
    }

    /// Parse an in-memory `.param` text and `.bin` payload.
    pub fn parse(param_text: &str, bin: &[u8]) -> Result<Self> {
        Ok(Self {
            param_path: None,
            desc: parse_model(param_text, bin)?,
        })
    }

    /// Source `.param` path; `None` for in-memory models.
    pub fn param_path(&self) -> Option<&Path> {
        self.param_path.as_deref()
    }

    pub fn desc(&self) -> &ModelDesc {
        &self.desc
    }

    pub fn into_desc(self) -> ModelDesc {
        self.desc
    }
}

struct BinCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BinCursor<'a> {
    fn take(&mut self, nbytes: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(nbytes)
            .ok_or_else(|| anyhow!("attribute size overflow"))?;
        if end > self.data.len() {
            bail!(
                "bin payload too short: need {} bytes at offset {}, have {}",
                nbytes,
                self.offset,
                self.data.len()
            );
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}

fn parse_model(text: &str, bin: &[u8]) -> Result<ModelDesc> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (_, magic) = lines.next().ok_or_else(|| anyhow!("empty param file"))?;
    if magic != MAGIC {
        bail!("invalid param magic {}", magic);
    }
    let (count_line, counts) = lines
        .next()
        .ok_or_else(|| anyhow!("param file is missing the count line"))?;
    let mut count_tokens = counts.split_whitespace();
    let node_count = parse_count(count_tokens.next(), count_line, "node count")?;
    let _operand_count = parse_count(count_tokens.next(), count_line, "operand count")?;

    let mut cursor = BinCursor {
        data: bin,
        offset: 0,
    };
    let mut nodes = Vec::with_capacity(node_count);
    for (line_no, line) in lines {
        let node = parse_node(line, &mut cursor).with_context(|| format!("line {}", line_no))?;
        nodes.push(node);
    }
    if nodes.len() != node_count {
        bail!(
            "param file declares {} nodes but defines {}",
            node_count,
            nodes.len()
        );
    }
    let trailing = bin.len() - cursor.offset;
    ensure!(
        trailing == 0,
        "bin payload has {} trailing bytes after {} attribute bytes",
        trailing,
        cursor.offset
    );
    Ok(ModelDesc { nodes })
}

fn parse_count(token: Option<&str>, line: usize, what: &str) -> Result<usize> {
    let token = token.ok_or_else(|| anyhow!("line {}: missing {}", line, what))?;
    token
        .parse::<usize>()
        .with_context(|| format!("line {}: invalid {} {}", line, what, token))
}

fn parse_node(line: &str, cursor: &mut BinCursor<'_>) -> Result<NodeDesc> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 4 {
        bail!("node line needs at least 4 fields, got {}", tokens.len());
    }
    let op_type = tokens[0].to_string();
    let name = tokens[1].to_string();
    let n_in = tokens[2]
        .parse::<usize>()
        .with_context(|| format!("node {}: invalid input count", name))?;
    let n_out = tokens[3]
        .parse::<usize>()
        .with_context(|| format!("node {}: invalid output count", name))?;
    let fixed = 4 + n_in + n_out;
    if tokens.len() < fixed {
        bail!(
            "node {} declares {} inputs and {} outputs but the line is too short",
            name,
            n_in,
            n_out
        );
    }
    let input_names = &tokens[4..4 + n_in];
    let output_names = &tokens[4 + n_in..fixed];

    let mut params = BTreeMap::new();
    let mut attrs = BTreeMap::new();
    let mut operand_shapes = HashMap::new();
    for token in &tokens[fixed..] {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| anyhow!("node {}: malformed entry {}", name, token))?;
        if let Some(attr_name) = key.strip_prefix('@') {
            let (shape, dtype) = parse_typed_shape(value)
                .with_context(|| format!("node {}: attribute {}", name, attr_name))?;
            let shape = shape
                .into_iter()
                .map(|dim| {
                    usize::try_from(dim)
                        .map_err(|_| anyhow!("attribute {} has an unknown dimension", attr_name))
                })
                .collect::<Result<Vec<_>>>()?;
            let dtype = AttrDType::parse(&dtype)?;
            let nbytes = shape.iter().product::<usize>() * dtype.size_in_bytes();
            let data = cursor
                .take(nbytes)
                .with_context(|| format!("node {}: attribute {}", name, attr_name))?
                .to_vec();
            attrs.insert(attr_name.to_string(), Attribute { dtype, shape, data });
        } else if let Some(operand) = key.strip_prefix('#') {
            let (shape, _dtype) = parse_typed_shape(value)
                .with_context(|| format!("node {}: operand {}", name, operand))?;
            operand_shapes.insert(operand.to_string(), shape);
        } else if let Some(param) = parse_param(value) {
            params.insert(key.to_string(), param);
        }
    }

    let operand = |name: &&str| OperandDesc {
        name: name.to_string(),
        shape: operand_shapes.get(*name).cloned().unwrap_or_default(),
    };
    Ok(NodeDesc {
        op_type,
        name,
        inputs: input_names.iter().map(operand).collect(),
        outputs: output_names.iter().map(operand).collect(),
        params,
        attrs,
    })
}

/// Parse `(d0,d1,...)dtype`; `?` marks an unknown dimension.
fn parse_typed_shape(value: &str) -> Result<(Vec<i64>, String)> {
    let rest = value
        .strip_prefix('(')
        .ok_or_else(|| anyhow!("shape {} must start with '('", value))?;
    let (dims, dtype) = rest
        .split_once(')')
        .ok_or_else(|| anyhow!("shape {} is missing ')'", value))?;
    let shape = dims
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            if dim == "?" {
                Ok(-1)
            } else {
                dim.parse::<i64>()
                    .with_context(|| format!("invalid dimension {}", dim))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((shape, dtype.to_string()))
}

/// Parse a `key=value` parameter value. `None` values are dropped.
pub(crate) fn parse_param(value: &str) -> Option<Parameter> {
    match value {
        "None" => return None,
        "True" => return Some(Parameter::Bool(true)),
        "False" => return Some(Parameter::Bool(false)),
        _ => {}
    }
    if let Some(inner) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>();
        if let Ok(ints) = items
            .iter()
            .map(|item| item.parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
        {
            return Some(Parameter::IntArray(ints));
        }
        if let Ok(floats) = items
            .iter()
            .map(|item| item.parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
        {
            return Some(Parameter::FloatArray(floats));
        }
        return Some(Parameter::Str(value.to_string()));
    }
    if let Ok(int) = value.parse::<i64>() {
        return Some(Parameter::Int(int));
    }
    if looks_like_float(value) {
        if let Ok(float) = value.parse::<f32>() {
            return Some(Parameter::Float(float));
        }
    }
    Some(Parameter::Str(
        value.trim_matches(|c| c == '\'' || c == '"').to_string(),
    ))
}

fn looks_like_float(value: &str) -> bool {
    value
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        .unwrap_or(false)
}
