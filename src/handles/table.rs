use super::ObjectKind;
use crate::error::{Result, TraceError};
use fnv::FnvHashMap;

/// Forward and (optionally) reverse id maps for one object kind
#[derive(Debug, Default, Clone)]
pub(super) struct KindMap {
    pub(super) forward: FnvHashMap<u32, u32>,
    pub(super) reverse: FnvHashMap<u32, u32>,
}

impl KindMap {
    pub(super) fn insert(&mut self, kind: ObjectKind, old: u32, new: u32) {
        if let Some(previous) = self.forward.insert(old, new) {
            if self.reverse.get(&previous) == Some(&old) {
                self.reverse.remove(&previous);
            }
        }
        if kind.tracks_reverse() {
            self.reverse.insert(new, old);
        }
    }

    pub(super) fn remove(&mut self, old: u32) -> Option<u32> {
        let new = self.forward.remove(&old)?;
        if self.reverse.get(&new) == Some(&old) {
            self.reverse.remove(&new);
        }
        Some(new)
    }
}

/// Record-time to replay-time id translation for every object kind
///
/// Id `0` (and location `-1`) mean "no object" and pass through untouched.
/// Uniform locations and uniform-block indices are keyed by the record-time
/// program id; releasing a program drops them.
#[derive(Debug, Clone)]
pub struct HandleTable {
    maps: Vec<KindMap>,
    scoped: FnvHashMap<(ObjectKind, u32, i32), i32>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            maps: vec![KindMap::default(); ObjectKind::ALL.len()],
            scoped: FnvHashMap::default(),
        }
    }

    /// Translate a record-time id, failing if no mapping exists
    pub fn resolve(&self, kind: ObjectKind, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        self.maps[kind.index()]
            .forward
            .get(&id)
            .copied()
            .ok_or(TraceError::UnknownHandle { kind, id })
    }

    /// Translate a record-time id, creating a live object on a miss
    ///
    /// Used by bind-style calls whose semantics create the object on first use.
    /// Returns the replay id and whether `create` was invoked.
    pub fn resolve_or_create<F>(&mut self, kind: ObjectKind, id: u32, create: F) -> (u32, bool)
    where
        F: FnOnce() -> u32,
    {
        if id == 0 {
            return (0, false);
        }
        if let Some(&new) = self.maps[kind.index()].forward.get(&id) {
            return (new, false);
        }
        let new = create();
        self.register(kind, id, new);
        (new, true)
    }

    /// Insert or overwrite a mapping
    pub fn register(&mut self, kind: ObjectKind, old: u32, new: u32) {
        if old == 0 {
            return;
        }
        self.maps[kind.index()].insert(kind, old, new);
    }

    /// Remove both directions of a mapping, returning the replay id it had
    pub fn release(&mut self, kind: ObjectKind, old: u32) -> Option<u32> {
        if old == 0 {
            return None;
        }
        if kind == ObjectKind::Program {
            self.scoped.retain(|&(_, program, _), _| program != old);
        }
        self.maps[kind.index()].remove(old)
    }

    /// Driver id back to the record-time id, for kinds that track it
    pub fn reverse(&self, kind: ObjectKind, new: u32) -> Option<u32> {
        if new == 0 {
            return Some(0);
        }
        self.maps[kind.index()].reverse.get(&new).copied()
    }

    pub fn contains(&self, kind: ObjectKind, old: u32) -> bool {
        old == 0 || self.maps[kind.index()].forward.contains_key(&old)
    }

    pub fn len(&self, kind: ObjectKind) -> usize {
        if kind.is_program_scoped() {
            return self.scoped.keys().filter(|(k, _, _)| *k == kind).count();
        }
        self.maps[kind.index()].forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scoped.is_empty() && self.maps.iter().all(|m| m.forward.is_empty())
    }

    /// Translate a program-scoped location or block index
    pub fn resolve_scoped(&self, kind: ObjectKind, program: u32, old: i32) -> Result<i32> {
        if old == -1 {
            return Ok(-1);
        }
        self.scoped
            .get(&(kind, program, old))
            .copied()
            .ok_or(TraceError::UnknownHandle {
                kind,
                id: old as u32,
            })
    }

    pub fn register_scoped(&mut self, kind: ObjectKind, program: u32, old: i32, new: i32) {
        if old == -1 {
            return;
        }
        self.scoped.insert((kind, program, old), new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_never_remapped() {
        let mut table = HandleTable::new();
        assert_eq!(table.resolve(ObjectKind::Buffer, 0).unwrap(), 0);
        table.register(ObjectKind::Buffer, 0, 55);
        assert_eq!(table.resolve(ObjectKind::Buffer, 0).unwrap(), 0);
        let (id, created) = table.resolve_or_create(ObjectKind::Texture, 0, || 9);
        assert_eq!((id, created), (0, false));
    }

    #[test]
    fn test_resolve_miss_is_unknown_handle() {
        let table = HandleTable::new();
        let err = table.resolve(ObjectKind::Texture, 7).unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnknownHandle {
                kind: ObjectKind::Texture,
                id: 7
            }
        ));
    }

    #[test]
    fn test_auto_create_on_bind() {
        let mut table = HandleTable::new();
        let (id, created) = table.resolve_or_create(ObjectKind::Texture, 7, || 1001);
        assert_eq!((id, created), (1001, true));
        // second lookup hits the mapping without creating
        let (id, created) =
            table.resolve_or_create(ObjectKind::Texture, 7, || panic!("created twice"));
        assert_eq!((id, created), (1001, false));
        assert_eq!(table.resolve(ObjectKind::Texture, 7).unwrap(), 1001);
    }

    #[test]
    fn test_release_removes_both_directions() {
        let mut table = HandleTable::new();
        table.register(ObjectKind::Buffer, 3, 40);
        assert_eq!(table.reverse(ObjectKind::Buffer, 40), Some(3));
        assert_eq!(table.release(ObjectKind::Buffer, 3), Some(40));
        assert!(table.resolve(ObjectKind::Buffer, 3).is_err());
        assert_eq!(table.reverse(ObjectKind::Buffer, 40), None);

        table.register(ObjectKind::Buffer, 3, 41);
        assert_eq!(table.resolve(ObjectKind::Buffer, 3).unwrap(), 41);
    }

    #[test]
    fn test_reverse_only_for_tracked_kinds() {
        let mut table = HandleTable::new();
        table.register(ObjectKind::Framebuffer, 2, 20);
        assert_eq!(table.reverse(ObjectKind::Framebuffer, 20), None);
        table.register(ObjectKind::Program, 2, 20);
        assert_eq!(table.reverse(ObjectKind::Program, 20), Some(2));
    }

    #[test]
    fn test_overwrite_drops_stale_reverse() {
        let mut table = HandleTable::new();
        table.register(ObjectKind::Shader, 5, 50);
        table.register(ObjectKind::Shader, 5, 51);
        assert_eq!(table.reverse(ObjectKind::Shader, 50), None);
        assert_eq!(table.reverse(ObjectKind::Shader, 51), Some(5));
    }

    #[test]
    fn test_locations_keyed_by_program() {
        let mut table = HandleTable::new();
        table.register(ObjectKind::Program, 1, 100);
        table.register_scoped(ObjectKind::UniformLocation, 1, 3, 7);
        table.register_scoped(ObjectKind::UniformLocation, 2, 3, 9);
        assert_eq!(
            table.resolve_scoped(ObjectKind::UniformLocation, 1, 3).unwrap(),
            7
        );
        assert_eq!(
            table.resolve_scoped(ObjectKind::UniformLocation, 2, 3).unwrap(),
            9
        );
        assert_eq!(
            table.resolve_scoped(ObjectKind::UniformLocation, 1, -1).unwrap(),
            -1
        );

        table.release(ObjectKind::Program, 1);
        assert!(table.resolve_scoped(ObjectKind::UniformLocation, 1, 3).is_err());
        assert_eq!(table.len(ObjectKind::UniformLocation), 1);
    }
}
