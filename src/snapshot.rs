use crate::models::UiNode;

/// Ordered text signals pulled from one UI snapshot, plus the orientation
/// flag derived from the root element's bounds.
#[derive(Debug, Clone, Default)]
pub struct FlattenedSignal {
    pub texts: Vec<String>,
    pub is_landscape: bool,
}

impl FlattenedSignal {
    /// Concatenation of the raw signals, used as the per-session content key
    /// for semantic-lane deduplication. Stable because traversal order is
    /// stable.
    pub fn content_key(&self) -> String {
        self.texts.concat()
    }
}

/// Single pass over the snapshot tree. Traversal is pre-order, left-to-right:
/// downstream joined strings and content keys depend on this order.
///
/// Orientation consults only the root node's bounds (width > height). Absent
/// or malformed bounds default to portrait.
pub fn flatten(tree: &[UiNode]) -> FlattenedSignal {
    let is_landscape = tree
        .first()
        .and_then(|root| root.bounds)
        .map(|b| b.width() > 0 && b.height() > 0 && b.width() > b.height())
        .unwrap_or(false);

    let mut texts = Vec::new();
    let mut stack: Vec<&UiNode> = tree.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if let Some(text) = &node.text {
            texts.push(text.clone());
        }
        if let Some(desc) = &node.content_description {
            texts.push(desc.clone());
        }
        if let Some(rid) = &node.resource_id {
            // Identifiers are mostly noise, but reel/shorts player ids are a
            // strong short-form-video marker downstream.
            if rid.contains("reel") {
                texts.push(rid.clone());
            }
        }
        stack.extend(node.children.iter().rev());
    }

    FlattenedSignal {
        texts,
        is_landscape,
    }
}
