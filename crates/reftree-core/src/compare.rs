//! Structural comparison.
//!
//! Two trees are equal when they have the same keys, the same payload at
//! each key, and the same ordered children. Pass resolved views to compare
//! logical content regardless of how either side uses references.

use reftree_types::{Key, KeyMap, TreeResult, IDENTITY};

use crate::traits::IdAddressable;

/// First difference found between two trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mismatch {
    /// One tree is empty and the other is not.
    Root,
    /// Corresponding nodes carry different keys.
    Key { left: Key, right: Key },
    /// Payloads differ.
    Content { left: Key, right: Key },
    /// Child counts differ.
    Children { left: Key, right: Key },
}

/// Compare whole trees, keys taken as equal when identical.
pub fn find_mismatch<C: PartialEq>(
    left: &dyn IdAddressable<C>,
    right: &dyn IdAddressable<C>,
) -> TreeResult<Option<Mismatch>> {
    match (left.root(), right.root()) {
        (None, None) => Ok(None),
        (Some(l), Some(r)) => subtree_mismatch(left, &l, right, &r, &IDENTITY),
        _ => Ok(Some(Mismatch::Root)),
    }
}

/// Whether both trees hold the same keys, shape and content.
pub fn tree_eq<C: PartialEq>(
    left: &dyn IdAddressable<C>,
    right: &dyn IdAddressable<C>,
) -> TreeResult<bool> {
    Ok(find_mismatch(left, right)?.is_none())
}

/// Compare the subtree at `left_key` with the one at `right_key`; a left key
/// matches a right key when `keymap` sends it there.
pub fn subtree_mismatch<C: PartialEq>(
    left: &dyn IdAddressable<C>,
    left_key: &Key,
    right: &dyn IdAddressable<C>,
    right_key: &Key,
    keymap: &dyn KeyMap,
) -> TreeResult<Option<Mismatch>> {
    let mut pending = vec![(left_key.clone(), right_key.clone())];
    let mut first = true;
    while let Some((l, r)) = pending.pop() {
        if !first && keymap.back_key(&l).as_ref() != Some(&r) {
            return Ok(Some(Mismatch::Key { left: l, right: r }));
        }
        first = false;
        if left.node(&l)? != right.node(&r)? {
            return Ok(Some(Mismatch::Content { left: l, right: r }));
        }
        let lc = left.children(&l)?;
        let rc = right.children(&r)?;
        if lc.len() != rc.len() {
            return Ok(Some(Mismatch::Children { left: l, right: r }));
        }
        pending.extend(lc.into_iter().zip(rc).rev());
    }
    Ok(None)
}
