use crate::element::TreeValue;
use crate::geometry::{Box3D, CoordType};

/// Maximum fan-out of a node.
pub(crate) const MAX_CHILDREN: usize = 16;
/// Minimum fill of a non-root node.
pub(crate) const MIN_CHILDREN: usize = 2;

#[derive(Debug, Clone)]
pub(crate) enum Node<T> {
    Internal(InternalNode<T>),
    Leaf(LeafNode<T>),
}

#[derive(Debug, Clone)]
pub(crate) struct InternalNode<T> {
    pub bbox: Box3D,
    pub children: Vec<Node<T>>,
}

#[derive(Debug, Clone)]
pub(crate) struct LeafNode<T> {
    pub bbox: Box3D,
    pub elements: Vec<T>,
}

impl<T: TreeValue> Node<T> {
    pub(crate) fn bbox(&self) -> &Box3D {
        match self {
            Node::Internal(node) => &node.bbox,
            Node::Leaf(node) => &node.bbox,
        }
    }

    pub(crate) fn leaf_with(elements: Vec<T>) -> Node<T> {
        let bbox = bbox_of_elements(&elements);
        Node::Leaf(LeafNode { bbox, elements })
    }

    pub(crate) fn internal_with(children: Vec<Node<T>>) -> Node<T> {
        let bbox = bbox_of_nodes(&children);
        Node::Internal(InternalNode { bbox, children })
    }

    /// Inserts `element`, growing bounding boxes along the path. Returns a
    /// split-off sibling when this node overflowed.
    pub(crate) fn insert(&mut self, element: T) -> Option<Node<T>> {
        match self {
            Node::Leaf(leaf) => {
                leaf.bbox.merge(&element.bounding_box());
                leaf.elements.push(element);
                if leaf.elements.len() <= MAX_CHILDREN {
                    return None;
                }
                let (kept, split_off) =
                    linear_split(std::mem::take(&mut leaf.elements), |e| e.bounding_box());
                leaf.bbox = bbox_of_elements(&kept);
                leaf.elements = kept;
                Some(Node::leaf_with(split_off))
            }
            Node::Internal(internal) => {
                let target = choose_subtree(&internal.children, &element.bounding_box());
                internal.bbox.merge(&element.bounding_box());
                let sibling = internal.children[target].insert(element)?;
                internal.children.push(sibling);
                if internal.children.len() <= MAX_CHILDREN {
                    return None;
                }
                let (kept, split_off) =
                    linear_split(std::mem::take(&mut internal.children), |n| *n.bbox());
                internal.bbox = bbox_of_nodes(&kept);
                internal.children = kept;
                Some(Node::internal_with(split_off))
            }
        }
    }
}

pub(crate) fn bbox_of_elements<T: TreeValue>(elements: &[T]) -> Box3D {
    let mut bbox = Box3D::inverted();
    for element in elements {
        bbox.merge(&element.bounding_box());
    }
    bbox
}

pub(crate) fn bbox_of_nodes<T: TreeValue>(nodes: &[Node<T>]) -> Box3D {
    let mut bbox = Box3D::inverted();
    for node in nodes {
        bbox.merge(node.bbox());
    }
    bbox
}

/// Picks the child whose bounding box needs the least volume enlargement to
/// cover `bbox`; ties go to the smaller box.
fn choose_subtree<T: TreeValue>(children: &[Node<T>], bbox: &Box3D) -> usize {
    let mut best = 0;
    let mut best_enlargement = CoordType::INFINITY;
    let mut best_volume = CoordType::INFINITY;
    for (idx, child) in children.iter().enumerate() {
        let volume = child.bbox().volume();
        let enlargement = child.bbox().merged(bbox).volume() - volume;
        if enlargement < best_enlargement
            || (enlargement == best_enlargement && volume < best_volume)
        {
            best = idx;
            best_enlargement = enlargement;
            best_volume = volume;
        }
    }
    best
}

/// Guttman's linear split: seed the two groups with the pair showing the
/// greatest normalized separation along any axis, then distribute the rest
/// by least enlargement, honoring the minimum fill.
pub(crate) fn linear_split<I>(items: Vec<I>, bbox_of: impl Fn(&I) -> Box3D) -> (Vec<I>, Vec<I>) {
    debug_assert!(items.len() > MAX_CHILDREN);
    let boxes: Vec<Box3D> = items.iter().map(&bbox_of).collect();

    let (seed_a, seed_b) = pick_seeds(&boxes);

    let mut group_a: Vec<I> = Vec::with_capacity(items.len());
    let mut group_b: Vec<I> = Vec::with_capacity(items.len());
    let mut bbox_a = boxes[seed_a];
    let mut bbox_b = boxes[seed_b];

    let mut remaining: Vec<(I, Box3D)> = Vec::with_capacity(items.len() - 2);
    for (idx, item) in items.into_iter().enumerate() {
        if idx == seed_a {
            group_a.push(item);
        } else if idx == seed_b {
            group_b.push(item);
        } else {
            remaining.push((item, boxes[idx]));
        }
    }

    for (pending_idx, (item, bbox)) in remaining.into_iter().enumerate().rev() {
        let left_over = pending_idx + 1;
        // If one group is starved, everything remaining must go to it.
        if group_a.len() + left_over <= MIN_CHILDREN {
            bbox_a.merge(&bbox);
            group_a.push(item);
            continue;
        }
        if group_b.len() + left_over <= MIN_CHILDREN {
            bbox_b.merge(&bbox);
            group_b.push(item);
            continue;
        }
        let enlargement_a = bbox_a.merged(&bbox).volume() - bbox_a.volume();
        let enlargement_b = bbox_b.merged(&bbox).volume() - bbox_b.volume();
        let pick_a = match enlargement_a.partial_cmp(&enlargement_b) {
            Some(std::cmp::Ordering::Less) => true,
            Some(std::cmp::Ordering::Greater) => false,
            _ => group_a.len() <= group_b.len(),
        };
        if pick_a {
            bbox_a.merge(&bbox);
            group_a.push(item);
        } else {
            bbox_b.merge(&bbox);
            group_b.push(item);
        }
    }

    (group_a, group_b)
}

/// The seed pair for the linear split: per axis, the item with the highest
/// low side and the one with the lowest high side; the axis with the widest
/// normalized separation wins.
fn pick_seeds(boxes: &[Box3D]) -> (usize, usize) {
    let mut best_separation = CoordType::NEG_INFINITY;
    let mut seeds = (0, 1);
    for dim in 0..3 {
        let mut lowest_low = 0;
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut highest_high = 0;
        for (idx, bbox) in boxes.iter().enumerate() {
            if bbox.min_corner[dim] < boxes[lowest_low].min_corner[dim] {
                lowest_low = idx;
            }
            if bbox.min_corner[dim] > boxes[highest_low].min_corner[dim] {
                highest_low = idx;
            }
            if bbox.max_corner[dim] < boxes[lowest_high].max_corner[dim] {
                lowest_high = idx;
            }
            if bbox.max_corner[dim] > boxes[highest_high].max_corner[dim] {
                highest_high = idx;
            }
        }
        let width =
            boxes[highest_high].max_corner[dim] - boxes[lowest_low].min_corner[dim];
        if width <= 0.0 {
            continue;
        }
        let separation = (boxes[highest_low].min_corner[dim]
            - boxes[lowest_high].max_corner[dim])
            / width;
        if separation > best_separation && highest_low != lowest_high {
            best_separation = separation;
            seeds = (highest_low, lowest_high);
        }
    }
    if seeds.0 == seeds.1 {
        seeds = (0, 1);
    }
    seeds
}
