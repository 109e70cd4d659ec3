//! Replaying a tree onto a mutable tree with single-node edits.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use reftree_core::{IdAddressable, MutableRefTree};
use reftree_types::{Key, Payload, Position, TreeError, TreeResult};

/// Key a source node has in the target: its reference target, or its own key.
fn target_key<C>(key: &Key, payload: &Payload<&C>) -> Key {
    payload.target().cloned().unwrap_or_else(|| key.clone())
}

/// Reshape `target` into `source` by update, insert, and move.
///
/// `source` is a raw reftree whose references name nodes of `target`: a tree
/// reference leaves the target subtree untouched, a node reference keeps the
/// target content and reconciles the children, a literal overwrites the
/// content. Target children that the source drops are deleted at the end, so
/// nodes moved elsewhere in the source survive. The source root must name
/// the target root.
pub fn apply_edits<C: Clone>(
    source: &dyn IdAddressable<C>,
    target: &mut dyn MutableRefTree<C>,
) -> TreeResult<()> {
    let root = source.root_key()?;
    let mut doomed: BTreeSet<Key> = BTreeSet::new();
    let (mut updated, mut inserted, mut moved) = (0usize, 0usize, 0usize);
    let mut pending = vec![root];
    while let Some(key) = pending.pop() {
        let payload = source.node(&key)?;
        let here = target_key(&key, &payload);
        match payload {
            Payload::TreeRef(_) => continue,
            Payload::Literal(content) => {
                if target.update(&here, Payload::Literal(content.clone()))? {
                    updated += 1;
                }
            }
            Payload::NodeRef(_) => {
                if !target.contains(&here) {
                    return Err(TreeError::not_found(&here));
                }
            }
        }

        let children = source.children(&key)?;
        let mut wanted = Vec::with_capacity(children.len());
        for child in &children {
            wanted.push(target_key(child, &source.node(child)?));
        }
        let keep: HashSet<&Key> = wanted.iter().collect();
        for existing in target.children(&here)? {
            if !keep.contains(&existing) {
                doomed.insert(existing);
            }
        }

        for (index, (child, want)) in children.iter().zip(&wanted).enumerate() {
            if target.contains(want) {
                doomed.remove(want);
                let in_place = target.children(&here)?.get(index) == Some(want);
                if !in_place {
                    target.move_node(want, &here, Position::At(index))?;
                    moved += 1;
                }
            } else {
                match source.node(child)? {
                    Payload::Literal(content) => {
                        target.insert(
                            &here,
                            Position::At(index),
                            Some(want.clone()),
                            Payload::Literal(content.clone()),
                        )?;
                        inserted += 1;
                    }
                    _ => return Err(TreeError::not_found(want)),
                }
            }
        }
        pending.extend(children.into_iter().rev());
    }

    let deleted = doomed.len();
    for key in doomed {
        if target.contains(&key) {
            target.delete(&key)?;
        }
    }
    debug!(updated, inserted, moved, deleted, "applied tree edits");
    Ok(())
}
