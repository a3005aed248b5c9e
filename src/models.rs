use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    File,
    Image,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Folder => "folder",
            FileKind::File => "file",
            FileKind::Image => "image",
        }
    }
}

impl FromStr for FileKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "folder" => Ok(FileKind::Folder),
            "file" => Ok(FileKind::File),
            "image" => Ok(FileKind::Image),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent reference of a node: the user's root (`0` on the wire) or the id
/// of one of their folders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ParentId {
    #[default]
    Root,
    Node(String),
}

impl ParentId {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "0" => ParentId::Root,
            id => ParentId::Node(id.to_string()),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentId::Root)
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentId::Root => f.write_str("0"),
            ParentId::Node(id) => f.write_str(id),
        }
    }
}

impl Serialize for ParentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParentId::Root => serializer.serialize_u8(0),
            ParentId::Node(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for ParentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(0) => ParentId::Root,
            Raw::Int(n) => ParentId::Node(n.to_string()),
            Raw::Str(s) => ParentId::parse(&s),
        })
    }
}

/// One entry of a user's file tree as kept in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub is_public: bool,
    pub parent_id: ParentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl FileNode {
    pub fn new(
        user_id: String,
        name: String,
        kind: FileKind,
        parent_id: ParentId,
        is_public: bool,
        local_path: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            kind,
            is_public,
            parent_id,
            local_path,
        }
    }
}

/// Upload input after request parsing: content is already decoded, nothing
/// is validated yet.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub parent_id: ParentId,
    pub is_public: bool,
    pub content: Option<Vec<u8>>,
}

/// Body of `POST /files`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub parent_id: ParentId,
    #[serde(default)]
    pub is_public: bool,
    /// Base64 encoded content.
    pub data: Option<String>,
}

impl CreateFileRequest {
    /// Undecodable `data` counts as missing.
    pub fn into_new_file(self) -> NewFile {
        let content = self
            .data
            .as_deref()
            .and_then(|data| general_purpose::STANDARD.decode(data.trim()).ok());

        NewFile {
            name: self.name,
            kind: self.kind,
            parent_id: self.parent_id,
            is_public: self.is_public,
            content,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub parent_id: ParentId,
    pub page: Option<String>,
}

impl ListQuery {
    /// Unparseable pages fall back to the first one.
    pub fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub size: Option<String>,
}

impl DataQuery {
    pub fn width(&self) -> Option<u32> {
        self.size.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

/// Public view of a node. The blob path never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub is_public: bool,
    pub parent_id: ParentId,
}

impl From<&FileNode> for FileResponse {
    fn from(node: &FileNode) -> Self {
        Self {
            id: node.id.clone(),
            user_id: node.user_id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            is_public: node.is_public,
            parent_id: node.parent_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub redis: bool,
    pub db: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub users: usize,
    pub files: usize,
}
