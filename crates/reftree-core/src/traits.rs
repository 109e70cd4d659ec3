//! The tree interfaces.
//!
//! [`IdAddressable`] is the read side every tree, raw or resolved, offers.
//! [`MutableRefTree`] adds the four edits. [`BatchMutable`] and
//! [`ChangeTree`] are the extra capabilities a change buffer asks of the
//! tree that stores its edits.

use reftree_types::{Key, Payload, Position, TreeError, TreeResult};

/// Read access to an ordered tree by node key.
pub trait IdAddressable<C> {
    /// Key of the root, or `None` for an empty tree.
    fn root(&self) -> Option<Key>;

    fn contains(&self, key: &Key) -> bool;

    /// Payload of a node, or `None` if the key is absent.
    fn payload(&self, key: &Key) -> Option<Payload<&C>>;

    /// Parent key; `Ok(None)` for the root.
    fn parent(&self, key: &Key) -> TreeResult<Option<Key>>;

    /// Ordered child keys.
    fn children(&self, key: &Key) -> TreeResult<Vec<Key>>;

    /// Payload of a node that must exist.
    fn node(&self, key: &Key) -> TreeResult<Payload<&C>> {
        self.payload(key).ok_or_else(|| TreeError::not_found(key))
    }

    /// Key of the root of a tree that must not be empty.
    fn root_key(&self) -> TreeResult<Key> {
        self.root()
            .ok_or_else(|| TreeError::invalid("tree has no root"))
    }

    /// Whether `key` is `ancestor` or lies below it.
    fn is_within(&self, key: &Key, ancestor: &Key) -> TreeResult<bool> {
        let mut cursor = Some(key.clone());
        while let Some(current) = cursor {
            if &current == ancestor {
                return Ok(true);
            }
            cursor = self.parent(&current)?;
        }
        Ok(false)
    }

    /// All keys in preorder.
    fn keys(&self) -> TreeResult<Vec<Key>> {
        let mut out = Vec::new();
        let mut stack: Vec<Key> = self.root().into_iter().collect();
        while let Some(key) = stack.pop() {
            let mut children = self.children(&key)?;
            children.reverse();
            stack.extend(children);
            out.push(key);
        }
        Ok(out)
    }
}

impl<C, T: IdAddressable<C> + ?Sized> IdAddressable<C> for &T {
    fn root(&self) -> Option<Key> {
        (**self).root()
    }

    fn contains(&self, key: &Key) -> bool {
        (**self).contains(key)
    }

    fn payload(&self, key: &Key) -> Option<Payload<&C>> {
        (**self).payload(key)
    }

    fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        (**self).parent(key)
    }

    fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        (**self).children(key)
    }
}

/// Single-node edits.
///
/// Failures leave the tree unchanged: `NotFound` for absent keys,
/// `InvalidArgument` for key collisions and structurally illegal requests.
pub trait MutableRefTree<C>: IdAddressable<C> {
    /// Insert a new leaf under `parent`. `key` of [`AUTO_KEY`] asks the tree
    /// to generate one. Returns the key of the new node.
    ///
    /// [`AUTO_KEY`]: reftree_types::AUTO_KEY
    fn insert(
        &mut self,
        parent: &Key,
        pos: Position,
        key: Option<Key>,
        payload: Payload<C>,
    ) -> TreeResult<Key>;

    /// Remove a node and its whole subtree.
    fn delete(&mut self, key: &Key) -> TreeResult<()>;

    /// Re-parent a node, keeping its subtree. Returns the node's key.
    fn move_node(&mut self, key: &Key, parent: &Key, pos: Position) -> TreeResult<Key>;

    /// Replace a node's payload. Returns whether anything changed.
    fn update(&mut self, key: &Key, payload: Payload<C>) -> TreeResult<bool>;
}

/// Trees that accept a whole new version in one step.
pub trait BatchMutable<C> {
    /// Make this tree equal to `tree`, payload for payload.
    fn apply_tree(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()>;
}

/// The store a change buffer keeps its edits in.
pub trait ChangeTree<C>: MutableRefTree<C> {
    /// Drop every node and install a single root.
    fn reroot(&mut self, key: Key, payload: Payload<C>);

    /// Batch interface, when the tree has one.
    fn as_batch(&mut self) -> Option<&mut dyn BatchMutable<C>> {
        None
    }
}
