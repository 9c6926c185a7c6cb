/// Contiguous `order_index` maintenance for sibling lists.
///
/// Every function leaves the collection with exactly one item per index in
/// `0..len`. They rewrite the index of every item they touch, so callers
/// have to persist the whole collection afterwards, not only the item that
/// was moved or removed.
use crate::types::{Project, Task};

pub trait Ordered {
    fn order_index(&self) -> u32;
    fn set_order_index(&mut self, index: u32);
}

impl Ordered for Project {
    fn order_index(&self) -> u32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: u32) {
        self.order_index = index;
    }
}

impl Ordered for Task {
    fn order_index(&self) -> u32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: u32) {
        self.order_index = index;
    }
}

/// Index for an item appended to `siblings`.
pub fn next_index<T: Ordered>(siblings: &[T]) -> u32 {
    siblings
        .iter()
        .map(Ordered::order_index)
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}

/// Gives `item` the next free index at the end of `siblings`.
pub fn assign_initial_index<T: Ordered>(siblings: &[T], item: &mut T) {
    item.set_order_index(next_index(siblings));
}

/// Closes the gaps left by removed items. Call with the remaining items.
pub fn reindex_after_delete<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(Ordered::order_index);
    renumber(items);
}

/// Moves the item at `from` (position in index order) to `to`.
///
/// Out-of-range positions leave the list untouched and return `false`.
pub fn reindex_after_move<T: Ordered>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() || to >= items.len() {
        return false;
    }
    items.sort_by_key(Ordered::order_index);
    let moved = items.remove(from);
    items.insert(to, moved);
    renumber(items);
    true
}

/// True when the indices are exactly `0..len` in some order.
pub fn is_contiguous<T: Ordered>(items: &[T]) -> bool {
    let mut indices: Vec<u32> = items.iter().map(Ordered::order_index).collect();
    indices.sort_unstable();
    indices
        .iter()
        .enumerate()
        .all(|(position, index)| *index as usize == position)
}

fn renumber<T: Ordered>(items: &mut [T]) {
    for (position, item) in items.iter_mut().enumerate() {
        item.set_order_index(position as u32);
    }
}
