use ai_pipeline::AssetHandle;

pub const MAX_SELECTION: usize = 3;

/// Selected result indices. Images only, at most three, kept in the order
/// they were picked (that order is the animation frame order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    indices: Vec<usize>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `index` if selected; otherwise add it when it points at an
    /// image and there is room. Returns whether the set changed.
    pub fn toggle(&mut self, index: usize, results: &[AssetHandle]) -> bool {
        if let Some(pos) = self.indices.iter().position(|&i| i == index) {
            self.indices.remove(pos);
            return true;
        }

        let is_image = results.get(index).is_some_and(AssetHandle::is_image);
        if is_image && self.indices.len() < MAX_SELECTION {
            self.indices.push(index);
            return true;
        }
        false
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// Keep indices pointing at the same assets after an insert at `at`
    pub(crate) fn shift_for_insert(&mut self, at: usize) {
        for i in self.indices.iter_mut() {
            if *i >= at {
                *i += 1;
            }
        }
    }
}
