//! Load driver
//!
//! [`DataLoader`] feeds elements to a [`LoadTree`] in document order,
//! retries deferred updaters as ids become resolvable and saves completed
//! roots through an [`ArchetypeService`].
//!
//! # Lifecycle of a state
//!
//! 1. Created when its `<data>` element starts; attributes are applied.
//! 2. On element end it is attached to its parent's collection, if it names
//!    one, then either parked (incomplete) or completed.
//! 3. A completed root is queued into the save batch. A completed child is
//!    saved along with its root.
//! 4. Parked states are revisited by [`DataLoader::process_deferred`] every
//!    time a state completes, and once more on [`DataLoader::flush`].

use crate::cache::IdRefCache;
use crate::config::LoaderConfig;
use crate::context::ServiceContext;
use crate::data::{ChildRef, Data};
use crate::error::{LoadError, UnresolvedReference};
use crate::reader::{ReadEvent, XmlReader};
use crate::state::{LoadState, LoadTree, StateId};
use crate::updater::{PendingUpdate, UpdaterKey};
use crate::visitor::{Visitor, Walk};
use dataload_model::{ArchetypeService, Object, ObjectRef};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Loaded object counts by archetype short name
pub type Statistics = BTreeMap<String, u64>;

#[derive(Debug)]
enum Frame {
    State {
        state: StateId,
        collection: Option<String>,
    },
    ChildRef,
}

/// Bulk loader for archetype data files
#[derive(Debug)]
pub struct DataLoader<S> {
    service: S,
    config: LoaderConfig,
    tree: LoadTree,
    cache: IdRefCache,
    /// Object reference to the state building it
    states: HashMap<ObjectRef, StateId>,
    open: Vec<Frame>,
    parked: Vec<StateId>,
    /// Completed roots awaiting save
    batch: IndexMap<ObjectRef, StateId>,
    /// Completed children awaiting save with their root
    children: IndexMap<ObjectRef, StateId>,
    statistics: Statistics,
}

impl<S: ArchetypeService> DataLoader<S> {
    /// Create loader
    #[must_use]
    pub fn new(service: S, config: LoaderConfig) -> Self {
        Self {
            service,
            config,
            tree: LoadTree::new(),
            cache: IdRefCache::new(),
            states: HashMap::new(),
            open: Vec::new(),
            parked: Vec::new(),
            batch: IndexMap::new(),
            children: IndexMap::new(),
            statistics: Statistics::new(),
        }
    }

    /// The archetype service
    #[inline]
    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Consume the loader, returning the service
    #[must_use]
    pub fn into_service(self) -> S {
        self.service
    }

    /// Loader configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Every state created so far
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &LoadTree {
        &self.tree
    }

    /// Declared ids
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &IdRefCache {
        &self.cache
    }

    /// Loaded object counts
    #[inline]
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// State of the object declared as `id`
    #[must_use]
    pub fn state(&self, id: &str) -> Option<&LoadState> {
        let reference = self.cache.reference(id)?;
        self.states.get(reference).map(|state| &self.tree[*state])
    }

    /// States still waiting on an id
    #[inline]
    #[must_use]
    pub fn parked(&self) -> &[StateId] {
        &self.parked
    }

    /// Number of roots queued for the next save
    #[inline]
    #[must_use]
    pub fn batched(&self) -> usize {
        self.batch.len()
    }

    /// Load every matching file under `dir`, in path order
    ///
    /// Files are matched on [`LoaderConfig::extension`]; subdirectories are
    /// only searched with [`LoaderConfig::recurse`]. Returns the number of
    /// files loaded.
    ///
    /// # Errors
    /// The first IO, XML or structural error.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, LoadError> {
        let mut files = Vec::new();
        collect_files(dir.as_ref(), &self.config.extension, self.config.recurse, &mut files)?;
        files.sort();
        for file in &files {
            self.load_file(file)?;
        }
        Ok(files.len())
    }

    /// Load one file
    ///
    /// # Errors
    /// The first IO, XML or structural error.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| LoadError::io(path, err))?;
        self.load_str(&source, &path.display().to_string())
    }

    /// Load a document held in memory; `path` is used for diagnostics
    ///
    /// References left unresolved at the end of the document are not an
    /// error here, a later document may declare them. See
    /// [`DataLoader::finish`].
    ///
    /// # Errors
    /// The first XML or structural error.
    pub fn load_str(&mut self, source: &str, path: &str) -> Result<(), LoadError> {
        tracing::info!("Loading {}", path);
        self.open.clear();
        for event in XmlReader::new(source, path) {
            match event? {
                ReadEvent::Data(data) => self.start_data(&data)?,
                ReadEvent::ChildRef(child) => self.start_child_ref(&child)?,
                ReadEvent::End => self.end_element()?,
            }
        }
        tracing::info!("Loaded {}: {} states, {} parked", path, self.tree.len(), self.parked.len());
        Ok(())
    }

    /// Resolve what can be resolved and save the batch
    ///
    /// Returns the number of objects saved.
    ///
    /// # Errors
    /// A structural error raised applying a resolved reference.
    pub fn flush(&mut self) -> Result<usize, LoadError> {
        self.process_deferred()?;
        for state in self.batch.values().map(|s| &self.tree[*s]) {
            for reference in state.unsaved() {
                if self.batch.contains_key(reference) || self.children.contains_key(reference) {
                    continue;
                }
                tracing::warn!(
                    "Cannot save {} from {}: requires {}, id={}",
                    state.archetype(),
                    state.location(),
                    reference,
                    self.cache.id_of(reference).unwrap_or("<unset>")
                );
            }
        }
        Ok(self.save_batch())
    }

    /// Flush until nothing more resolves, then report outstanding ids
    ///
    /// # Errors
    /// [`LoadError::UnresolvedReferences`] naming every id still awaited,
    /// with the element waiting on it; or a structural error.
    pub fn finish(&mut self) -> Result<(), LoadError> {
        loop {
            let before = self.outstanding();
            let saved = self.flush()?;
            let after = self.outstanding();
            if after == 0 || (saved == 0 && after >= before) {
                break;
            }
        }
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            let total: u64 = self.statistics.values().sum();
            tracing::info!("Load complete: {} objects", total);
            Ok(())
        } else {
            Err(LoadError::UnresolvedReferences(unresolved))
        }
    }

    /// Ids still awaited, in element order
    ///
    /// A parent waiting only to attach an incomplete child is left out; the
    /// child names the id itself.
    #[must_use]
    pub fn unresolved(&self) -> Vec<UnresolvedReference> {
        self.tree
            .iter()
            .flat_map(|(_, state)| {
                state
                    .local_deferred()
                    .filter(|updater| !updater.attaches_only())
                    .map(|updater| UnresolvedReference {
                        id: updater.id().to_owned(),
                        archetype: state.archetype().to_owned(),
                        location: state.location().clone(),
                    })
            })
            .collect()
    }

    /// Retry deferred updaters of parked states until a pass resolves
    /// nothing
    ///
    /// Parked states found complete are completed. An updater whose id
    /// refers to a queued root triggers an early save of that root, so the
    /// reference can be durable.
    ///
    /// # Errors
    /// A structural error raised applying a resolved reference.
    pub fn process_deferred(&mut self) -> Result<(), LoadError> {
        loop {
            let mut pending: IndexMap<UpdaterKey, PendingUpdate> = IndexMap::new();
            let mut completed = Vec::new();
            for state in std::mem::take(&mut self.parked) {
                if self.tree.is_complete(state) {
                    completed.push(state);
                    continue;
                }
                for update in self.tree[state].deferred() {
                    pending.entry(update.key).or_insert_with(|| update.clone());
                }
                self.parked.push(state);
            }
            for state in completed {
                self.completed(state)?;
            }

            let mut processed = false;
            for update in pending.into_values() {
                let Some(reference) = self.cache.reference(&update.id).cloned() else {
                    continue;
                };
                if reference.is_new() {
                    self.attempt_save(&reference);
                }
                let context =
                    ServiceContext::new(&self.cache, &self.service, self.config.validate_only);
                if self.tree.retry(update.owner, &update.id, &context)?.is_resolved() {
                    processed = true;
                }
            }
            if !processed {
                return Ok(());
            }
        }
    }

    fn start_data(&mut self, data: &Data) -> Result<(), LoadError> {
        let parent = self.current();
        self.log(format_args!(
            "Start {} parent={}",
            data,
            parent.map_or("none", |p| self.tree[p].archetype())
        ));
        match (parent, data.collection()) {
            (None, Some(_)) => {
                return Err(LoadError::NoParentForChild {
                    location: data.location().clone(),
                });
            }
            (Some(_), None) => {
                return Err(LoadError::NoCollectionAttribute {
                    location: data.location().clone(),
                });
            }
            _ => {}
        }
        let descriptor =
            self.service
                .archetype(data.archetype())
                .ok_or_else(|| LoadError::InvalidArchetype {
                    archetype: data.archetype().to_owned(),
                    location: data.location().clone(),
                })?;
        let object = self.service.create(&descriptor);
        let reference = object.reference().clone();
        if let Some(id) = data.id() {
            if !self.cache.add(id, reference.clone()) {
                return Err(LoadError::DuplicateId {
                    id: id.to_owned(),
                    location: data.location().clone(),
                });
            }
        }
        let state = self
            .tree
            .push(parent, object, descriptor, data.location().clone());
        self.states.insert(reference, state);

        let context = ServiceContext::new(&self.cache, &self.service, self.config.validate_only);
        for (name, value) in data.attributes() {
            if value.is_empty() {
                continue;
            }
            self.tree.set_value(state, name, value, &context)?;
        }
        self.open.push(Frame::State {
            state,
            collection: data.collection().map(str::to_owned),
        });
        Ok(())
    }

    fn start_child_ref(&mut self, child: &ChildRef) -> Result<(), LoadError> {
        let Some(parent) = self.current() else {
            return Err(LoadError::NoParentForChild {
                location: child.location().clone(),
            });
        };
        let context = ServiceContext::new(&self.cache, &self.service, self.config.validate_only);
        let added =
            self.tree
                .add_child_by_id(parent, child.collection(), child.child_id(), &context)?;
        self.log(format_args!(
            "Child id:{} of {} {}",
            child.child_id(),
            self.tree[parent].archetype(),
            if added { "added" } else { "deferred" }
        ));
        self.open.push(Frame::ChildRef);
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), LoadError> {
        let Some(Frame::State { state, collection }) = self.open.pop() else {
            return Ok(());
        };
        if let Some(collection) = collection {
            let parent = self.tree[state]
                .parent()
                .ok_or_else(|| LoadError::NoParentForChild {
                    location: self.tree[state].location().clone(),
                })?;
            self.tree.add_child(parent, &collection, state)?;
        }
        if self.tree.is_complete(state) {
            let resolve = !self.parked.is_empty();
            self.completed(state)?;
            if resolve {
                self.process_deferred()?;
            }
        } else {
            tracing::debug!(
                "Parked {} at {}",
                self.tree[state].archetype(),
                self.tree[state].location()
            );
            self.parked.push(state);
        }
        Ok(())
    }

    fn completed(&mut self, state: StateId) -> Result<(), LoadError> {
        let loaded = &self.tree[state];
        *self
            .statistics
            .entry(loaded.archetype().to_owned())
            .or_insert(0) += 1;
        self.log(format_args!("Created {}", loaded.object().reference()));

        let reference = loaded.object().reference().clone();
        let is_root = loaded.parent().is_none();
        if self.config.validate_only {
            let object = self.tree.object_mut(state);
            self.service.derive_values(object)?;
            self.service.validate(object)?;
        } else if is_root {
            self.queue(state, reference)?;
        } else {
            self.children.insert(reference, state);
        }
        Ok(())
    }

    fn queue(&mut self, state: StateId, reference: ObjectRef) -> Result<(), LoadError> {
        self.service.derive_values(self.tree.object_mut(state))?;
        self.batch.insert(reference, state);
        if self.batch.len() >= self.config.batch_size && self.batch_complete() {
            self.save_batch();
        }
        Ok(())
    }

    /// True if every unsaved reference held by the batch will be saved
    /// with it
    fn batch_complete(&self) -> bool {
        self.batch.values().all(|state| {
            self.tree[*state].unsaved().all(|reference| {
                self.batch.contains_key(reference) || self.children.contains_key(reference)
            })
        })
    }

    fn attempt_save(&mut self, reference: &ObjectRef) {
        let Some(&root) = self.batch.get(reference) else {
            return;
        };
        if !self.tree.is_complete(root) {
            return;
        }
        let group = self.group(root, &mut Visitor::new());
        let objects = self.objects(&group);
        match self.service.save_all(objects) {
            Ok(saved) => {
                self.batch.shift_remove(reference);
                self.saved(&saved, &[root]);
            }
            Err(err) => tracing::debug!("Early save of {} failed: {}", reference, err),
        }
    }

    /// Save queued roots with their attached descendants
    ///
    /// A failed batch is retried root by root. Returns the number of
    /// objects saved.
    fn save_batch(&mut self) -> usize {
        if self.batch.is_empty() {
            return 0;
        }
        let roots: Vec<StateId> = self.batch.drain(..).map(|(_, state)| state).collect();
        let mut visitor = Visitor::new();
        let mut groups = Vec::with_capacity(roots.len());
        for root in &roots {
            groups.push(self.group(*root, &mut visitor));
        }
        let all: Vec<StateId> = groups.iter().flatten().copied().collect();
        let objects = self.objects(&all);
        match self.service.save_all(objects) {
            Ok(saved) => {
                tracing::info!("Saved batch of {} objects", saved.len());
                self.saved(&saved, &roots);
                saved.len()
            }
            Err(err) => {
                tracing::error!("Failed to save batch, saving objects individually: {}", err);
                let mut total = 0;
                for group in &groups {
                    let Some(&root) = group.first() else {
                        continue;
                    };
                    let objects = self.objects(group);
                    match self.service.save_all(objects) {
                        Ok(saved) => {
                            total += saved.len();
                            self.saved(&saved, &roots);
                        }
                        Err(err) => {
                            let root = &self.tree[root];
                            tracing::error!(
                                "Failed to save {} from {}: {}",
                                root.archetype(),
                                root.location(),
                                err
                            );
                        }
                    }
                }
                total
            }
        }
    }

    /// `root` and every attached descendant not yet visited
    fn group(&mut self, root: StateId, visitor: &mut Visitor) -> Vec<StateId> {
        let mut states = Vec::new();
        visitor.visit(&mut self.tree, root, |_, state| {
            states.push(state);
            Walk::Continue
        });
        states
    }

    fn objects(&self, states: &[StateId]) -> Vec<Object> {
        states
            .iter()
            .map(|state| self.tree[*state].object().clone())
            .collect()
    }

    /// Make saved references durable everywhere they are held
    fn saved(&mut self, saved: &[ObjectRef], extra: &[StateId]) {
        for reference in saved {
            self.cache.update(reference);
            if let Some(&state) = self.states.get(reference) {
                self.tree.mark_saved(state, reference);
            }
            self.children.shift_remove(reference);
        }
        let starts: Vec<StateId> = self
            .open
            .iter()
            .filter_map(|frame| match frame {
                Frame::State { state, .. } => Some(*state),
                Frame::ChildRef => None,
            })
            .chain(self.parked.iter().copied())
            .chain(self.batch.values().copied())
            .chain(self.children.values().copied())
            .chain(extra.iter().copied())
            .collect();
        for reference in saved {
            self.tree.update_all(starts.iter().copied(), reference);
        }
    }

    /// Innermost open state; a childId element has none of its own
    fn current(&self) -> Option<StateId> {
        self.open.iter().rev().find_map(|frame| match frame {
            Frame::State { state, .. } => Some(*state),
            Frame::ChildRef => None,
        })
    }

    fn outstanding(&self) -> usize {
        self.parked
            .iter()
            .map(|state| self.tree[*state].deferred().count())
            .sum()
    }

    fn log(&self, message: fmt::Arguments<'_>) {
        if self.config.verbose {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
    }
}

fn collect_files(
    dir: &Path,
    extension: &str,
    recurse: bool,
    files: &mut Vec<PathBuf>,
) -> Result<(), LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|err| LoadError::io(dir, err))?;
    for entry in entries {
        let path = entry.map_err(|err| LoadError::io(dir, err))?.path();
        if path.is_dir() {
            if recurse {
                collect_files(&path, extension, recurse, files)?;
            }
        } else if path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataload_model::{
        ArchetypeDescriptor, MemoryArchetypeService, NodeDescriptor, NodeKind, StoreError, Value,
    };
    use pretty_assertions::assert_eq;

    fn service() -> MemoryArchetypeService {
        MemoryArchetypeService::new([
            ArchetypeDescriptor::new("x", [NodeDescriptor::new("name", NodeKind::Reference)]),
            ArchetypeDescriptor::new("y", [NodeDescriptor::new("label", NodeKind::Text)]),
            ArchetypeDescriptor::new(
                "owner",
                [
                    NodeDescriptor::new("code", NodeKind::Text).required(),
                    NodeDescriptor::new("pets", NodeKind::Collection),
                ],
            ),
            ArchetypeDescriptor::new("pet", [NodeDescriptor::new("name", NodeKind::Text)]),
        ])
    }

    fn loader(batch_size: usize) -> DataLoader<MemoryArchetypeService> {
        DataLoader::new(service(), LoaderConfig::new().with_batch_size(batch_size))
    }

    fn stored_reference(loader: &DataLoader<MemoryArchetypeService>, archetype: &str, node: &str) -> ObjectRef {
        loader.service().by_archetype(archetype)[0]
            .value(node)
            .and_then(Value::as_reference)
            .cloned()
            .unwrap()
    }

    #[test]
    fn forward_reference_is_resolved_before_save() {
        let mut loader = loader(0);
        loader
            .load_str(
                r#"<archetype>
                    <data archetype="x" name="id:2"/>
                    <data id="2" archetype="y" label="target"/>
                </archetype>"#,
                "forward.xml",
            )
            .unwrap();
        loader.finish().unwrap();

        let y = loader.service().by_archetype("y")[0].reference().clone();
        let name = stored_reference(&loader, "x", "name");
        assert_eq!(name, y);
        assert!(!name.is_new());
        assert!(loader.parked().is_empty());
        assert_eq!(loader.statistics().get("x"), Some(&1));
        assert_eq!(loader.statistics().get("y"), Some(&1));
    }

    #[test]
    fn unsaved_reference_is_saved_in_the_same_batch() {
        let mut loader = loader(10);
        loader
            .load_str(
                r#"<archetype>
                    <data id="2" archetype="y" label="target"/>
                    <data archetype="x" name="id:2"/>
                </archetype>"#,
                "backward.xml",
            )
            .unwrap();
        assert_eq!(loader.batched(), 2);
        assert!(loader.service().is_empty());

        assert_eq!(loader.flush().unwrap(), 2);
        let name = stored_reference(&loader, "x", "name");
        assert_eq!(name.id(), loader.cache().reference("2").and_then(ObjectRef::id));
        assert!(name.id().is_some());
    }

    #[test]
    fn missing_id_is_reported_on_finish() {
        let mut loader = loader(0);
        loader
            .load_str("<archetype>\n<data archetype=\"x\" name=\"id:missing\"/>\n</archetype>", "missing.xml")
            .unwrap();

        let err = loader.finish().unwrap_err();
        let LoadError::UnresolvedReferences(unresolved) = err else {
            panic!("expected unresolved references, got {err}");
        };
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, "missing");
        assert_eq!(unresolved[0].archetype, "x");
        assert_eq!(unresolved[0].location.line(), 2);
        assert!(loader.service().is_empty());
    }

    #[test]
    fn nested_child_is_saved_with_its_root() {
        let mut loader = loader(0);
        loader
            .load_str(
                r#"<data archetype="owner" code="A">
                    <data collection="pets" archetype="pet" name="Fido"/>
                </data>"#,
                "nested.xml",
            )
            .unwrap();
        loader.finish().unwrap();

        let owner = loader.service().by_archetype("owner")[0];
        let pet = loader.service().by_archetype("pet")[0];
        assert_eq!(owner.collection("pets"), std::slice::from_ref(pet.reference()));
        assert_eq!(loader.service().len(), 2);
    }

    #[test]
    fn child_id_declared_later_is_attached() {
        for batch_size in [0, 10] {
            let mut loader = loader(batch_size);
            loader
                .load_str(
                    r#"<archetype>
                        <data archetype="owner" code="A">
                            <data collection="pets" childId="id:p1"/>
                        </data>
                        <data id="p1" archetype="pet" name="Rex"/>
                    </archetype>"#,
                    "child.xml",
                )
                .unwrap();
            loader.finish().unwrap();

            let owner = loader.service().by_archetype("owner")[0];
            let pet = loader.service().by_archetype("pet")[0];
            assert_eq!(owner.collection("pets"), std::slice::from_ref(pet.reference()));
        }
    }

    #[test]
    fn structural_errors() {
        let cases = [
            (r#"<data id="a" archetype="y"/><data id="a" archetype="y"/>"#.to_owned(), "duplicate"),
            (r#"<data archetype="nope"/>"#.to_owned(), "archetype"),
            (r#"<data collection="pets" archetype="pet"/>"#.to_owned(), "parent"),
            (r#"<data collection="pets" childId="id:p"/>"#.to_owned(), "parent"),
            (r#"<data archetype="owner"><data archetype="pet"/></data>"#.to_owned(), "collection"),
            (r#"<data archetype="y" colour="red"/>"#.to_owned(), "attribute"),
        ];
        for (source, expected) in cases {
            let source = format!("<archetype>{source}</archetype>");
            let err = loader(0).load_str(&source, "bad.xml").unwrap_err();
            let matched = match expected {
                "duplicate" => matches!(err, LoadError::DuplicateId { ref id, .. } if id == "a"),
                "archetype" => matches!(err, LoadError::InvalidArchetype { .. }),
                "parent" => matches!(err, LoadError::NoParentForChild { .. }),
                "collection" => matches!(err, LoadError::NoCollectionAttribute { .. }),
                _ => matches!(err, LoadError::InvalidAttribute { .. }),
            };
            assert!(matched, "{expected}: {err}");
            assert!(err.is_structural());
        }
    }

    #[test]
    fn validate_only_saves_nothing() {
        let config = LoaderConfig::new().with_validate_only(true);
        let mut loader = DataLoader::new(service(), config.clone());
        loader
            .load_str(
                r#"<archetype>
                    <data archetype="owner" code="A">
                        <data collection="pets" childId="id:p1"/>
                    </data>
                    <data id="p1" archetype="pet" name="Rex"/>
                </archetype>"#,
                "valid.xml",
            )
            .unwrap();
        loader.finish().unwrap();
        assert!(loader.service().is_empty());
        assert_eq!(loader.batched(), 0);
        assert_eq!(loader.statistics().values().sum::<u64>(), 2);

        let mut loader = DataLoader::new(service(), config);
        let err = loader
            .load_str(r#"<data archetype="owner"/>"#, "invalid.xml")
            .unwrap_err();
        assert!(matches!(err, LoadError::Store(StoreError::MissingRequired { .. })));
    }

    #[test]
    fn empty_attribute_is_ignored() {
        let mut loader = loader(0);
        loader
            .load_str(r#"<data archetype="y" label=""/>"#, "empty.xml")
            .unwrap();
        assert_eq!(loader.service().by_archetype("y")[0].value("label"), None);
    }
}
