//! Groups: hierarchical namespaces of arrays and other groups
//!
//! A group is a node with a metadata document and no data. Its children are
//! the nodes whose paths extend the group's path by one component. Creating
//! any node also creates the groups above it that do not exist yet.

use crate::array::Array;
use crate::codec::CodecRegistry;
use crate::config::ArrayConfig;
use crate::error::{ArrayError, Result};
use crate::metadata::{is_group_document, ArrayMetadata, GroupMetadata, NodeMetadata, METADATA_KEY};
use crate::store::Store;
use crate::utils::{join_key, metadata_key, node_prefix, normalize_path};
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A node opened through a group
#[derive(Debug, Clone)]
pub enum Node {
    Array(Array),
    Group(Group),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Array(a) => a.path(),
            Node::Group(g) => g.path(),
        }
    }
}

/// Write an empty group document for every ancestor of `path` that has none.
///
/// Fails if an ancestor is an array.
pub(crate) async fn ensure_parent_groups(store: &dyn Store, path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    let parts: Vec<&str> = path.split('/').collect();
    let empty = Bytes::from(GroupMetadata::new(Map::new()).to_json()?);
    for depth in 0..parts.len() {
        let ancestor = parts[..depth].join("/");
        let key = metadata_key(&ancestor);
        if store.set_if_absent(&key, empty.clone()).await? {
            log::debug!("Created implicit group {ancestor:?}");
            continue;
        }
        let existing = store
            .get(&key)
            .await?
            .ok_or_else(|| ArrayError::NotFound(format!("no node at {ancestor:?}")))?;
        if !is_group_document(&existing)? {
            return Err(ArrayError::validation(format!(
                "cannot create {path:?} below the array {ancestor:?}"
            )));
        }
    }
    Ok(())
}

/// Handle to a group in a store
#[derive(Clone)]
pub struct Group {
    store: Arc<dyn Store>,
    path: String,
    metadata: GroupMetadata,
    registry: CodecRegistry,
    config: ArrayConfig,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("path", &self.path)
            .field("attributes", &self.metadata.attributes)
            .finish()
    }
}

impl Group {
    /// Create a group at `path`, failing if a node already exists there
    pub async fn create(
        store: Arc<dyn Store>,
        path: &str,
        attributes: Map<String, Value>,
    ) -> Result<Self> {
        let path = normalize_path(path)?;
        ensure_parent_groups(store.as_ref(), &path).await?;
        let metadata = GroupMetadata::new(attributes);
        let document = Bytes::from(metadata.to_json()?);
        if !store.set_if_absent(&metadata_key(&path), document).await? {
            return Err(ArrayError::AlreadyExists(format!(
                "a node already exists at {path:?}"
            )));
        }
        log::debug!("Created group {path:?}");
        Ok(Self {
            store,
            path,
            metadata,
            registry: CodecRegistry::default(),
            config: ArrayConfig::default(),
        })
    }

    /// Open an existing group
    pub async fn open(store: Arc<dyn Store>, path: &str) -> Result<Self> {
        let path = normalize_path(path)?;
        let document = store
            .get(&metadata_key(&path))
            .await?
            .ok_or_else(|| ArrayError::NotFound(format!("no group at {path:?}")))?;
        let registry = CodecRegistry::default();
        match NodeMetadata::from_json(&document, &registry)? {
            NodeMetadata::Group(metadata) => Ok(Self {
                store,
                path,
                metadata,
                registry,
                config: ArrayConfig::default(),
            }),
            NodeMetadata::Array(_) => Err(ArrayError::validation(format!(
                "node at {path:?} is an array, not a group"
            ))),
        }
    }

    /// Use `config` for arrays created or opened through this group
    pub fn with_config(mut self, config: ArrayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `registry` for arrays created or opened through this group
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.metadata.attributes
    }

    fn child_path(&self, name: &str) -> Result<String> {
        let name = normalize_path(name)?;
        if name.is_empty() {
            return Err(ArrayError::validation("child name must not be empty"));
        }
        Ok(join_key(&self.path, &name))
    }

    fn child_group(&self, path: String, metadata: GroupMetadata) -> Group {
        Group {
            store: self.store.clone(),
            path,
            metadata,
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }

    /// Persist new attributes
    pub async fn set_attributes(&mut self, attributes: Map<String, Value>) -> Result<()> {
        let metadata = GroupMetadata::new(attributes);
        let document = Bytes::from(metadata.to_json()?);
        self.store.set(&metadata_key(&self.path), document).await?;
        self.metadata = metadata;
        Ok(())
    }

    pub async fn create_group(&self, name: &str, attributes: Map<String, Value>) -> Result<Group> {
        let group = Group::create(self.store.clone(), &self.child_path(name)?, attributes).await?;
        Ok(group
            .with_config(self.config.clone())
            .with_registry(self.registry.clone()))
    }

    pub async fn create_array(&self, name: &str, metadata: ArrayMetadata) -> Result<Array> {
        Array::create_with_registry(
            self.store.clone(),
            &self.child_path(name)?,
            metadata,
            self.config.clone(),
            self.registry.clone(),
        )
        .await
    }

    /// Open the group `name`, creating it if absent. Fails if `name` is an array.
    pub async fn require_group(&self, name: &str) -> Result<Group> {
        match self.get(name).await {
            Ok(Node::Group(group)) => Ok(group),
            Ok(Node::Array(array)) => Err(ArrayError::AlreadyExists(format!(
                "{:?} is an array, not a group",
                array.path()
            ))),
            Err(ArrayError::NotFound(_)) => match self.create_group(name, Map::new()).await {
                // lost a creation race to another group
                Err(ArrayError::AlreadyExists(_)) => match self.get(name).await? {
                    Node::Group(group) => Ok(group),
                    Node::Array(array) => Err(ArrayError::AlreadyExists(format!(
                        "{:?} is an array, not a group",
                        array.path()
                    ))),
                },
                result => result,
            },
            Err(e) => Err(e),
        }
    }

    /// Open the array `name`, creating it from `metadata` if absent.
    ///
    /// An existing array must have the shape and data type of `metadata`.
    pub async fn require_array(&self, name: &str, metadata: ArrayMetadata) -> Result<Array> {
        match self.get(name).await {
            Ok(Node::Array(array)) => {
                if array.shape() != metadata.shape() || array.data_type() != metadata.data_type() {
                    return Err(ArrayError::validation(format!(
                        "array {:?} has shape {:?} and type {}, requested {:?} and {}",
                        array.path(),
                        array.shape(),
                        array.data_type(),
                        metadata.shape(),
                        metadata.data_type()
                    )));
                }
                Ok(array)
            }
            Ok(Node::Group(group)) => Err(ArrayError::AlreadyExists(format!(
                "{:?} is a group, not an array",
                group.path()
            ))),
            Err(ArrayError::NotFound(_)) => self.create_array(name, metadata).await,
            Err(e) => Err(e),
        }
    }

    /// Open the child node `name`, which may be nested (`a/b`)
    pub async fn get(&self, name: &str) -> Result<Node> {
        let path = self.child_path(name)?;
        let document = self
            .store
            .get(&metadata_key(&path))
            .await?
            .ok_or_else(|| ArrayError::NotFound(format!("no node at {path:?}")))?;
        match NodeMetadata::from_json(&document, &self.registry)? {
            NodeMetadata::Array(_) => Ok(Node::Array(
                Array::open_with_registry(
                    self.store.clone(),
                    &path,
                    self.config.clone(),
                    self.registry.clone(),
                )
                .await?,
            )),
            NodeMetadata::Group(metadata) => Ok(Node::Group(self.child_group(path, metadata))),
        }
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        self.store.exists(&metadata_key(&self.child_path(name)?)).await
    }

    /// Remove the child `name` with its metadata, chunks and descendants
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.child_path(name)?;
        if !self.store.exists(&metadata_key(&path)).await? {
            return Err(ArrayError::NotFound(format!("no node at {path:?}")));
        }
        self.store.delete_prefix(&node_prefix(&path)).await?;
        log::debug!("Deleted node {path:?}");
        Ok(())
    }

    /// Relative paths of the descendants at most `max_depth` levels below the
    /// direct children (`Some(0)` for direct children only, `None` for all),
    /// sorted
    pub async fn member_names_to_depth(&self, max_depth: Option<usize>) -> Result<Vec<String>> {
        let prefix = node_prefix(&self.path);
        let suffix = format!("/{METADATA_KEY}");
        let keys: Vec<String> = self.store.list_prefix(&prefix).try_collect().await?;
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| key[prefix.len()..].strip_suffix(&suffix))
            .filter(|name| !name.is_empty())
            .filter(|name| max_depth.map_or(true, |d| name.matches('/').count() <= d))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Names of the direct children, sorted
    pub async fn member_names(&self) -> Result<Vec<String>> {
        self.member_names_to_depth(Some(0)).await
    }

    /// The descendants down to `max_depth`, see [`Self::member_names_to_depth`]
    pub async fn members_to_depth(&self, max_depth: Option<usize>) -> Result<Vec<(String, Node)>> {
        let mut members = Vec::new();
        for name in self.member_names_to_depth(max_depth).await? {
            let node = self.get(&name).await?;
            members.push((name, node));
        }
        Ok(members)
    }

    /// The direct children, sorted by name
    pub async fn members(&self) -> Result<Vec<(String, Node)>> {
        self.members_to_depth(Some(0)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DataType;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn small_array() -> ArrayMetadata {
        ArrayMetadata::builder(vec![4], vec![2], DataType::UInt8)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_hierarchy() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store.clone(), "", attrs(json!({"title": "root"})))
            .await
            .unwrap();
        let sub = root.create_group("sub", Map::new()).await.unwrap();
        assert_eq!(sub.path(), "sub");
        sub.create_array("values", small_array()).await.unwrap();
        root.create_array("top", small_array()).await.unwrap();

        assert_eq!(root.member_names().await.unwrap(), vec!["sub", "top"]);
        assert_eq!(sub.member_names().await.unwrap(), vec!["values"]);
        assert!(root.contains("sub/values").await.unwrap());
        assert!(!root.contains("nothing").await.unwrap());

        match root.get("sub/values").await.unwrap() {
            Node::Array(array) => assert_eq!(array.path(), "sub/values"),
            Node::Group(_) => panic!("expected an array"),
        }
        let members = root.members().await.unwrap();
        assert!(matches!(members[0].1, Node::Group(_)));
        assert!(matches!(members[1].1, Node::Array(_)));

        let reopened = Group::open(store.clone(), "/").await.unwrap();
        assert_eq!(reopened.attributes(), &attrs(json!({"title": "root"})));
        assert!(Group::open(store.clone(), "top").await.is_err());
        assert!(matches!(
            root.get("missing").await,
            Err(ArrayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_child() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store, "root", Map::new()).await.unwrap();
        root.create_group("a", Map::new()).await.unwrap();
        let err = root.create_group("a", Map::new()).await.unwrap_err();
        assert!(matches!(err, ArrayError::AlreadyExists(_)));
        assert!(root.create_group("", Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_set_attributes() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut group = Group::create(store.clone(), "g", Map::new()).await.unwrap();
        group
            .set_attributes(attrs(json!({"version": 2})))
            .await
            .unwrap();
        let reopened = Group::open(store, "g").await.unwrap();
        assert_eq!(reopened.attributes()["version"], json!(2));
    }

    #[tokio::test]
    async fn test_create_creates_parents() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Array::create(store.clone(), "a/b/c", small_array(), ArrayConfig::default())
            .await
            .unwrap();
        for path in ["", "a", "a/b"] {
            let group = Group::open(store.clone(), path).await.unwrap();
            assert!(group.attributes().is_empty());
        }
        Group::create(store.clone(), "x/y", Map::new()).await.unwrap();
        assert!(Group::open(store.clone(), "x").await.is_ok());

        // nothing can be created below an array
        let err = Group::create(store.clone(), "a/b/c/d", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArrayError::Validation(_)));
        assert!(!store.exists("a/b/c/d/zarr.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_member() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store.clone(), "", Map::new()).await.unwrap();
        let sub = root.create_group("sub", Map::new()).await.unwrap();
        let array = sub.create_array("values", small_array()).await.unwrap();
        array
            .write(
                &crate::selection::Selection::all(),
                &crate::buffer::ArrayBuffer::from_elements(vec![4], &[1u8, 2, 3, 4]).unwrap(),
            )
            .await
            .unwrap();
        root.create_group("subsub", Map::new()).await.unwrap();

        root.delete("sub").await.unwrap();
        assert!(!root.contains("sub").await.unwrap());
        assert!(!root.contains("sub/values").await.unwrap());
        assert!(!store.exists("sub/values/c/0").await.unwrap());
        // siblings sharing a name prefix are untouched
        assert_eq!(root.member_names().await.unwrap(), vec!["subsub"]);
        assert!(matches!(
            root.delete("sub").await,
            Err(ArrayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_require_group() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store, "", Map::new()).await.unwrap();
        let mut created = root.require_group("g").await.unwrap();
        created
            .set_attributes(attrs(json!({"kept": true})))
            .await
            .unwrap();
        let again = root.require_group("g").await.unwrap();
        assert_eq!(again.attributes()["kept"], json!(true));

        root.create_array("arr", small_array()).await.unwrap();
        assert!(root.require_group("arr").await.is_err());
    }

    #[tokio::test]
    async fn test_require_array() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store, "", Map::new()).await.unwrap();
        let created = root.require_array("arr", small_array()).await.unwrap();
        let existing = root.require_array("arr", small_array()).await.unwrap();
        assert_eq!(created.metadata(), existing.metadata());

        let other_shape = ArrayMetadata::builder(vec![5], vec![2], DataType::UInt8)
            .build()
            .unwrap();
        assert!(root.require_array("arr", other_shape).await.is_err());
        let other_type = ArrayMetadata::builder(vec![4], vec![2], DataType::Int16)
            .build()
            .unwrap();
        assert!(root.require_array("arr", other_type).await.is_err());

        root.create_group("grp", Map::new()).await.unwrap();
        assert!(root.require_array("grp", small_array()).await.is_err());
    }

    #[tokio::test]
    async fn test_members_to_depth() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let root = Group::create(store.clone(), "", Map::new()).await.unwrap();
        Array::create(store, "a/b/c", small_array(), ArrayConfig::default())
            .await
            .unwrap();
        root.create_group("z", Map::new()).await.unwrap();

        assert_eq!(root.member_names().await.unwrap(), vec!["a", "z"]);
        assert_eq!(
            root.member_names_to_depth(Some(1)).await.unwrap(),
            vec!["a", "a/b", "z"]
        );
        let all = root.members_to_depth(None).await.unwrap();
        let names: Vec<&str> = all.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "a/b", "a/b/c", "z"]);
        assert!(matches!(all[2].1, Node::Array(_)));
    }
}
