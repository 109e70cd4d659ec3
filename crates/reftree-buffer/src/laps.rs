//! Random edit sequences run against a change buffer and a plain tree side by
//! side. After every edit the resolved buffer must equal the plain tree.

use std::collections::HashSet;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use reftree_core::{find_mismatch, IdAddressable, MemTree, MutableRefTree};
use reftree_types::{Key, KeyMap, Payload, Position};

use crate::{BufferConfig, ChangeBuffer};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn random_backing(rng: &mut StdRng, size: usize) -> MemTree<String> {
    let mut tree = MemTree::rooted(Key::name("n0"), Payload::Literal("v0".to_string()));
    for i in 1..size {
        let parent = Key::name(format!("n{}", rng.gen_range(0..i)));
        tree.append(&parent, Key::name(format!("n{i}")), Payload::Literal(format!("v{i}")))
            .unwrap();
    }
    tree
}

/// Front keys are back keys with an `f.` prefix.
#[derive(Debug)]
struct Prefixed;

impl KeyMap for Prefixed {
    fn back_key(&self, front: &Key) -> Option<Key> {
        front.as_name()?.strip_prefix("f.").map(Key::name)
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        back.as_name().map(|name| Key::name(format!("f.{name}")))
    }
}

/// Copy of `tree` with every key passed through `rename`.
fn renamed(tree: &MemTree<String>, rename: &dyn Fn(&Key) -> Key) -> MemTree<String> {
    let root = tree.root_key().unwrap();
    let mut out = MemTree::rooted(rename(&root), tree.node(&root).unwrap().cloned());
    for key in tree.keys().unwrap().into_iter().skip(1) {
        let parent = tree.parent(&key).unwrap().unwrap();
        out.append(&rename(&parent), rename(&key), tree.node(&key).unwrap().cloned())
            .unwrap();
    }
    out
}

struct Lap {
    rng: StdRng,
    buffer: ChangeBuffer<String, MemTree<String>>,
    /// The expected tree, in front keys.
    facit: MemTree<String>,
    keymap: Box<dyn KeyMap>,
    fresh: u64,
}

impl Lap {
    fn new(seed: u64, size: usize, prefixed: bool) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let backing = random_backing(&mut rng, size);
        let keymap: Box<dyn KeyMap> = if prefixed {
            Box::new(Prefixed)
        } else {
            Box::new(reftree_types::IDENTITY)
        };
        let facit = renamed(&backing, &|key| keymap.front_key(key).unwrap());
        let buffer: ChangeBuffer<String, MemTree<String>> = if prefixed {
            ChangeBuffer::with_keymap(backing, Prefixed, BufferConfig::default()).unwrap()
        } else {
            ChangeBuffer::new(backing).unwrap()
        };
        Self {
            rng,
            buffer,
            facit,
            keymap,
            fresh: 0,
        }
    }

    fn pick(&mut self, keys: &[Key]) -> Key {
        keys[self.rng.gen_range(0..keys.len())].clone()
    }

    fn front(&self, back: &Key) -> Key {
        self.keymap.front_key(back).unwrap()
    }

    fn back(&self, front: &Key) -> Option<Key> {
        self.keymap.back_key(front)
    }

    /// Backing keys the plain tree no longer holds.
    fn deleted_backing_keys(&self) -> Vec<Key> {
        self.buffer
            .backing()
            .keys()
            .unwrap()
            .into_iter()
            .filter(|back| !self.facit.contains(&self.front(back)))
            .collect()
    }

    /// Deleted backing nodes none of whose descendants are live.
    fn deleted_backing_subtrees(&self) -> Vec<Key> {
        let backing = self.buffer.backing();
        self.deleted_backing_keys()
            .into_iter()
            .filter(|target| {
                backing.keys().unwrap().into_iter().all(|back| {
                    !backing.is_within(&back, target).unwrap()
                        || !self.facit.contains(&self.front(&back))
                })
            })
            .collect()
    }

    fn position(&mut self, parent: &Key, moving: Option<&Key>) -> Position {
        let siblings = self
            .facit
            .children(parent)
            .unwrap()
            .into_iter()
            .filter(|sibling| Some(sibling) != moving)
            .count();
        Position::At(self.rng.gen_range(0..=siblings))
    }

    fn step(&mut self) {
        let keys = self.facit.keys().unwrap();
        let root = self.facit.root_key().unwrap();
        let movable: Vec<Key> = keys.iter().filter(|k| **k != root).cloned().collect();
        match self.rng.gen_range(0..6) {
            0 => {
                let key = self.pick(&keys);
                let content = match self.back(&key) {
                    Some(back) if self.rng.gen_bool(0.3) => match self.buffer.backing().payload(&back) {
                        Some(Payload::Literal(content)) => content.clone(),
                        _ => "u".to_string(),
                    },
                    _ => format!("u{}", self.rng.gen_range(0..3)),
                };
                let expected = self
                    .facit
                    .update(&key, Payload::Literal(content.clone()))
                    .unwrap();
                let changed = self.buffer.update(&key, Payload::Literal(content)).unwrap();
                assert_eq!(changed, expected, "update {key}");
            }
            1 => {
                let parent = self.pick(&keys);
                let deleted = self.deleted_backing_keys();
                let key = if !deleted.is_empty() && self.rng.gen_bool(0.5) {
                    let back = self.pick(&deleted);
                    self.front(&back)
                } else {
                    self.fresh += 1;
                    Key::name(format!("f.x{}", self.fresh))
                };
                let pos = self.position(&parent, None);
                let payload = Payload::Literal(format!("i{}", self.fresh));
                self.facit.insert(&parent, pos, Some(key.clone()), payload.clone()).unwrap();
                self.buffer.insert(&parent, pos, Some(key), payload).unwrap();
            }
            2 if !movable.is_empty() => {
                let key = self.pick(&movable);
                self.facit.delete(&key).unwrap();
                self.buffer.delete(&key).unwrap();
            }
            3 if !movable.is_empty() => {
                let key = self.pick(&movable);
                let parents: Vec<Key> = keys
                    .iter()
                    .filter(|p| !self.facit.is_within(p, &key).unwrap())
                    .cloned()
                    .collect();
                let parent = self.pick(&parents);
                let pos = self.position(&parent, Some(&key));
                self.facit.move_node(&key, &parent, pos).unwrap();
                self.buffer.move_node(&key, &parent, pos).unwrap();
            }
            4 => {
                let targets = self.deleted_backing_subtrees();
                if targets.is_empty() {
                    return;
                }
                let target = self.pick(&targets);
                let parent = self.pick(&keys);
                let pos = self.position(&parent, None);
                self.graft(&target, &parent, pos);
                let key = self.front(&target);
                self.buffer
                    .insert(&parent, pos, Some(key), Payload::TreeRef(target))
                    .unwrap();
            }
            5 => {
                let targets = self.deleted_backing_keys();
                if targets.is_empty() {
                    return;
                }
                let target = self.pick(&targets);
                let parent = self.pick(&keys);
                let pos = self.position(&parent, None);
                let content = self.buffer.backing().node(&target).unwrap().cloned();
                let key = self.front(&target);
                self.facit.insert(&parent, pos, Some(key.clone()), content).unwrap();
                self.buffer
                    .insert(&parent, pos, Some(key), Payload::NodeRef(target))
                    .unwrap();
            }
            _ => {}
        }
    }

    /// Copy the backing subtree at `target` into the plain tree.
    fn graft(&mut self, target: &Key, parent: &Key, pos: Position) {
        let backing = self.buffer.backing();
        let mut copies = vec![(target.clone(), parent.clone(), Some(pos))];
        while let Some((back, under, pos)) = copies.pop() {
            let key = self.front(&back);
            let payload = backing.node(&back).unwrap().cloned();
            let pos = pos.unwrap_or(Position::At(self.facit.children(&under).unwrap().len()));
            self.facit.insert(&under, pos, Some(key.clone()), payload).unwrap();
            for child in backing.children(&back).unwrap().into_iter().rev() {
                copies.push((child, key.clone(), None));
            }
        }
    }

    fn check(&self) {
        assert_eq!(
            find_mismatch::<String>(&self.buffer, &self.facit).unwrap(),
            None
        );
        for back in self.buffer.backing().keys().unwrap() {
            assert_eq!(
                self.buffer.is_deleted(&back),
                !self.facit.contains(&self.front(&back)),
                "deletion state of {back}"
            );
        }
    }

    /// Apply a copy of the change tree to a fresh buffer over the same
    /// backing tree.
    fn replay(&self, prefixed: bool) {
        let snapshot = MemTree::copy_of(self.buffer.change_tree()).unwrap();
        let backing = MemTree::copy_of(self.buffer.backing()).unwrap();
        let mut fresh: ChangeBuffer<String, MemTree<String>> = if prefixed {
            ChangeBuffer::with_keymap(backing, Prefixed, BufferConfig::default()).unwrap()
        } else {
            ChangeBuffer::new(backing).unwrap()
        };
        fresh.apply(&snapshot).unwrap();
        assert_eq!(find_mismatch::<String>(&fresh, &self.facit).unwrap(), None);
        for back in fresh.backing().keys().unwrap() {
            assert_eq!(
                fresh.is_deleted(&back),
                self.buffer.is_deleted(&back),
                "deletion state of {back} after apply"
            );
        }
    }
}

fn run(seed: u64, size: usize, steps: usize, prefixed: bool) {
    let mut lap = Lap::new(seed, size, prefixed);
    lap.check();
    for step in 0..steps {
        lap.step();
        lap.check();
        if step % 10 == 9 {
            lap.replay(prefixed);
        }
    }
    lap.replay(prefixed);
}

#[test]
fn seeded_laps() {
    init_tracing();
    for seed in 0..20 {
        run(seed, 30, 60, false);
    }
}

#[test]
fn seeded_laps_with_key_map() {
    init_tracing();
    for seed in 100..110 {
        run(seed, 25, 50, true);
    }
}

#[test]
fn delete_and_reinsert_restores_the_tree() {
    let mut rng = StdRng::seed_from_u64(7);
    let backing = random_backing(&mut rng, 20);
    let before = MemTree::copy_of(&backing).unwrap();
    let mut buffer: ChangeBuffer<String, _> = ChangeBuffer::new(backing).unwrap();
    let key = Key::name("n3");
    let parent = buffer.parent(&key).unwrap().unwrap();
    let index = buffer
        .children(&parent)
        .unwrap()
        .iter()
        .position(|child| *child == key)
        .unwrap();
    buffer.delete(&key).unwrap();
    buffer
        .insert(&parent, Position::At(index), Some(key.clone()), Payload::TreeRef(key))
        .unwrap();
    assert_eq!(find_mismatch::<String>(&buffer, &before).unwrap(), None);
    assert!(buffer.deletia().is_empty());
}

#[test]
fn reinserted_keys_leave_the_deletion_sets() {
    let mut rng = StdRng::seed_from_u64(11);
    let backing = random_backing(&mut rng, 15);
    let mut buffer: ChangeBuffer<String, _> = ChangeBuffer::new(backing).unwrap();
    let root = buffer.root_key().unwrap();
    let victim = buffer.children(&root).unwrap()[0].clone();
    let subtree: Vec<Key> = {
        let mut keys = vec![victim.clone()];
        let mut at = 0;
        while at < keys.len() {
            keys.extend(buffer.children(&keys[at]).unwrap());
            at += 1;
        }
        keys
    };
    buffer.delete(&victim).unwrap();
    let holder = Key::name("holder");
    buffer
        .insert(&root, Position::Natural, Some(holder.clone()), Payload::Literal("h".to_string()))
        .unwrap();

    // Rebuild the subtree by hand, literal by literal, below a new parent.
    for key in &subtree {
        let parent = buffer
            .backing()
            .parent(key)
            .unwrap()
            .filter(|p| *p != root && buffer.contains(p))
            .unwrap_or_else(|| holder.clone());
        buffer
            .insert(&parent, Position::Natural, Some(key.clone()), Payload::Literal("again".to_string()))
            .unwrap();
    }
    let gone: HashSet<&Key> = buffer
        .deletia()
        .roots()
        .iter()
        .chain(buffer.deletia().nodes())
        .collect();
    for key in &subtree {
        assert!(!gone.contains(key), "{key} is still recorded as deleted");
        assert!(!buffer.is_deleted(key));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_seed_keeps_the_buffer_in_step(seed in any::<u64>(), size in 2usize..40) {
        run(seed, size, 40, false);
    }
}
