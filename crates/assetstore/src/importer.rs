//! Binding pre-existing backend data into the hierarchy.
//!
//! The importer walks an Assetstore's own namespace and creates folders,
//! items and imported file records pointing at the data in place. Nothing is
//! copied and nothing in the source namespace is modified.

use crate::AssetstoreRegistry;
use assetstore_core::{
    Assetstore, AssetstoreId, File, Folder, FolderId, FolderParent, ImportDestination, Item,
};
use assetstore_error::{
    AssetstoreError, AssetstoreResult, StateError, StateErrorKind, ValidationError,
};
use assetstore_interface::{NamespaceEntry, NamespaceKind, ProgressReporter};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// What to import and where to put it.
///
/// # Examples
///
/// ```
/// use assetstore::ImportOptionsBuilder;
/// use assetstore_core::{FolderId, ImportDestination};
///
/// let options = ImportOptionsBuilder::default()
///     .path("/data/incoming")
///     .destination(ImportDestination::Folder(FolderId::new()))
///     .include("hello.*")
///     .build()
///     .unwrap();
/// assert_eq!(options.exclude, None);
/// assert!(!options.leaf_folders_as_items);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ImportOptions {
    /// Path or key prefix to import; empty for a whole bucket
    pub path: String,
    /// Folder receiving the imported tree
    pub destination: ImportDestination,
    /// Only file names matching this pattern, anchored at the start
    #[builder(setter(strip_option), default)]
    pub include: Option<String>,
    /// Skip file names matching this pattern, anchored at the start
    #[builder(setter(strip_option), default)]
    pub exclude: Option<String>,
    /// Turn directories without subdirectories into a single item
    #[builder(default)]
    pub leaf_folders_as_items: bool,
}

/// One imported file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    /// Source path or key
    pub path: String,
    /// Created or refreshed record
    pub file: File,
}

/// Stream of imported files.
pub type ImportStream = BoxStream<'static, AssetstoreResult<ImportRecord>>;

/// Creates hierarchy records for data already present in a backend.
#[derive(Clone)]
pub struct Importer {
    registry: Arc<AssetstoreRegistry>,
}

struct NameFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl NameFilter {
    fn new(options: &ImportOptions) -> AssetstoreResult<Self> {
        Ok(Self {
            include: anchored("fileIncludeRegex", options.include.as_deref())?,
            exclude: anchored("fileExcludeRegex", options.exclude.as_deref())?,
        })
    }

    /// Exclusion wins over inclusion.
    fn accepts(&self, name: &str) -> bool {
        self.include.as_ref().is_none_or(|re| re.is_match(name))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(name))
    }
}

fn anchored(field: &str, pattern: Option<&str>) -> AssetstoreResult<Option<Regex>> {
    pattern
        .map(|pattern| {
            Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
                AssetstoreError::from(ValidationError::field(
                    field,
                    format!("Invalid regular expression: {}", e),
                ))
            })
        })
        .transpose()
}

/// Replace control characters, and whitespace at either end, with `_`.
pub fn sanitize_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let leading = chars.iter().take_while(|c| c.is_whitespace()).count();
    let trailing = chars.iter().rev().take_while(|c| c.is_whitespace()).count();
    let end = chars.len().saturating_sub(trailing).max(leading);

    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i < leading || i >= end || c.is_control() {
                '_'
            } else {
                *c
            }
        })
        .collect()
}

struct PendingDirectory {
    entry: NamespaceEntry,
    parent: FolderId,
    root: bool,
}

impl Importer {
    /// Importer backed by a registry.
    pub fn new(registry: Arc<AssetstoreRegistry>) -> Self {
        Self { registry }
    }

    /// Lazily import `options.path` from an Assetstore.
    ///
    /// Directory nodes become folders, found or created so that re-imports
    /// never duplicate them; the contents of the import root go straight
    /// into the destination folder. Each file becomes an item holding one
    /// imported file, unless `leaf_folders_as_items` groups the files of a
    /// directory without subdirectories into one item named after it.
    /// Re-importing a name already present in an item refreshes that file.
    pub fn import(
        &self,
        assetstore_id: AssetstoreId,
        options: ImportOptions,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> ImportStream {
        let registry = self.registry.clone();
        try_stream! {
            let store = registry.load(assetstore_id).await?;
            let adapter = registry.require_adapter(&store).await?;
            let destination = match options.destination {
                ImportDestination::Folder(folder_id) => {
                    registry.metadata().load_folder(folder_id).await?.id
                }
                ImportDestination::User(_) => Err::<FolderId, _>(AssetstoreError::from(
                    ValidationError::field(
                        "destinationType",
                        format!(
                            "{} cannot be imported directly underneath a user.",
                            adapter.import_noun()
                        ),
                    ),
                ))?,
            };
            let filter = NameFilter::new(&options)?;
            let binder = Binder {
                registry: registry.clone(),
                store,
            };

            let root = adapter.stat_namespace(&options.path).await?;
            let mut imported = 0u64;

            if !root.is_directory() {
                if filter.accepts(&root.name) {
                    let mut item = binder.item(destination, &root.name).await?;
                    let record = binder.bind(&root, &mut item).await?;
                    imported += 1;
                    progress.update(imported, 0, &record.path);
                    yield record;
                }
            } else {
                let mut pending = vec![PendingDirectory {
                    entry: root,
                    parent: destination,
                    root: true,
                }];
                while let Some(PendingDirectory { entry, parent, root }) = pending.pop() {
                    if cancel.is_cancelled() {
                        Err::<(), _>(AssetstoreError::from(StateError::new(
                            StateErrorKind::Cancelled(format!("import of {}", options.path)),
                        )))?;
                    }

                    let children = adapter.list_namespace(&entry.path).await?;
                    let leaf = !children.iter().any(NamespaceEntry::is_directory);

                    if options.leaf_folders_as_items && leaf && !entry.name.is_empty() {
                        let mut item: Option<Item> = None;
                        for child in children.iter().filter(|c| filter.accepts(&c.name)) {
                            if item.is_none() {
                                item = Some(binder.item(parent, &entry.name).await?);
                            }
                            if let Some(item) = item.as_mut() {
                                let record = binder.bind(child, item).await?;
                                imported += 1;
                                progress.update(imported, 0, &record.path);
                                yield record;
                            }
                        }
                        continue;
                    }

                    let folder = if root {
                        parent
                    } else {
                        binder.folder(parent, &entry.name).await?
                    };
                    for child in children.iter().rev().filter(|c| c.is_directory()) {
                        pending.push(PendingDirectory {
                            entry: child.clone(),
                            parent: folder,
                            root: false,
                        });
                    }
                    for child in children.iter().filter(|c| !c.is_directory()) {
                        if !filter.accepts(&child.name) {
                            debug!(path = %child.path, "Skipping filtered file");
                            continue;
                        }
                        let mut item = binder.item(folder, &child.name).await?;
                        let record = binder.bind(child, &mut item).await?;
                        imported += 1;
                        progress.update(imported, 0, &record.path);
                        yield record;
                    }
                }
            }
            info!(path = %options.path, imported, "Import finished");
        }
        .boxed()
    }

    /// Run an import to completion and return the number of files imported.
    #[instrument(skip(self, options, progress, cancel), fields(assetstore = %assetstore_id, path = %options.path))]
    pub async fn import_all(
        &self,
        assetstore_id: AssetstoreId,
        options: ImportOptions,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> AssetstoreResult<u64> {
        self.import(assetstore_id, options, progress, cancel)
            .try_fold(0u64, |count, _| async move { Ok(count + 1) })
            .await
    }
}

/// Record creation shared by every step of one import.
struct Binder {
    registry: Arc<AssetstoreRegistry>,
    store: Assetstore,
}

impl Binder {
    async fn folder(&self, parent: FolderId, name: &str) -> AssetstoreResult<FolderId> {
        let metadata = self.registry.metadata();
        let name = sanitize_name(name);
        let parent = FolderParent::Folder(parent);
        if let Some(folder) = metadata.find_child_folder(parent, &name).await? {
            return Ok(folder.id);
        }
        let folder = Folder::new(name, parent);
        metadata.insert_folder(&folder).await?;
        debug!(name = %folder.name, "Created folder");
        Ok(folder.id)
    }

    async fn item(&self, folder_id: FolderId, name: &str) -> AssetstoreResult<Item> {
        let metadata = self.registry.metadata();
        let name = sanitize_name(name);
        if let Some(item) = metadata.find_item(folder_id, &name).await? {
            return Ok(item);
        }
        let item = Item::new(name, folder_id);
        metadata.insert_item(&item).await?;
        debug!(name = %item.name, "Created item");
        Ok(item)
    }

    /// Create or refresh the imported file for a namespace node.
    async fn bind(&self, entry: &NamespaceEntry, item: &mut Item) -> AssetstoreResult<ImportRecord> {
        let NamespaceKind::File { size, backend } = &entry.kind else {
            return Err(ValidationError::new(format!("{} is not a file.", entry.path)).into());
        };
        let metadata = self.registry.metadata();
        let name = sanitize_name(&entry.name);

        let file = match metadata.find_file_in_item(item.id, &name).await? {
            Some(mut file) => {
                item.size = (item.size + size).saturating_sub(file.size);
                file.size = *size;
                file.assetstore_id = self.store.id;
                file.backend = backend.clone();
                file.imported = true;
                file.sha512 = None;
                file
            }
            None => {
                let mut file = File::new(name, *size, self.store.id, backend.clone());
                file.imported = true;
                file.item_id = Some(item.id);
                item.size += size;
                file
            }
        };
        metadata.save_file(&file).await?;
        metadata.update_item(item).await?;

        debug!(path = %entry.path, file = %file.id, "Imported file");
        Ok(ImportRecord {
            path: entry.path.clone(),
            file,
        })
    }
}
