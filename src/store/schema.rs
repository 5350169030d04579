//! Declared index schema: queryable fields and the key prefix they cover.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    /// Documents whose key starts with this prefix are indexed.
    pub prefix: String,
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// JSON path into the document, e.g. `$.name`.
    pub path: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        sortable: bool,
    },
    Tag,
    Vector {
        algorithm: VectorAlgorithm,
        dim: usize,
        metric: DistanceMetric,
        element: VectorType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VectorAlgorithm {
    Hnsw,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VectorType {
    Float32,
}

impl VectorAlgorithm {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hnsw => "HNSW",
            Self::Flat => "FLAT",
        }
    }
}

impl DistanceMetric {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "COSINE",
            Self::L2 => "L2",
            Self::Ip => "IP",
        }
    }
}

impl SchemaField {
    /// Top-level document field addressed by `path`.
    pub fn field_name(&self) -> &str {
        json_field_name(&self.path)
    }
}

/// Strip the `$.` root from a JSON path.
fn json_field_name(path: &str) -> &str {
    path.strip_prefix("$.").unwrap_or(path)
}

impl IndexSchema {
    /// The vector field at `path` and its dimensionality.
    pub fn vector_field(&self, path: &str) -> Option<(&SchemaField, usize)> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::Vector { dim, .. } if f.path == path => Some((f, dim)),
            _ => None,
        })
    }

    /// Arguments for RediSearch `FT.CREATE`, starting with the index name.
    pub fn to_ft_create_args(&self) -> Vec<String> {
        let mut args = vec![
            self.name.clone(),
            "ON".to_string(),
            "JSON".to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            self.prefix.clone(),
            "SCHEMA".to_string(),
        ];

        for field in &self.fields {
            args.push(field.path.clone());
            match &field.kind {
                FieldKind::Text { sortable } => {
                    args.push("TEXT".to_string());
                    if *sortable {
                        args.push("SORTABLE".to_string());
                    }
                }
                FieldKind::Tag => args.push("TAG".to_string()),
                FieldKind::Vector {
                    algorithm,
                    dim,
                    metric,
                    element: VectorType::Float32,
                } => {
                    args.extend([
                        "VECTOR".to_string(),
                        algorithm.as_str().to_string(),
                        "6".to_string(),
                        "TYPE".to_string(),
                        "FLOAT32".to_string(),
                        "DIM".to_string(),
                        dim.to_string(),
                        "DISTANCE_METRIC".to_string(),
                        metric.as_str().to_string(),
                    ]);
                }
            }
        }

        args
    }
}
