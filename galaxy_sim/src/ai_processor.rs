/// Multiplicative utility score built from a series of considerations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AIAction {
    pub importance: f32,
    pub considerations_count: u32,
    pub highest_consideration: f32,
}

impl Default for AIAction {
    fn default() -> Self {
        Self::new()
    }
}

impl AIAction {
    pub const fn new() -> Self {
        Self {
            importance: 1.0,
            considerations_count: 0,
            highest_consideration: 0.0,
        }
    }

    pub fn apply_consideration(&mut self, value: f32) {
        self.importance *= value;
        self.considerations_count += 1;
        self.highest_consideration = self.highest_consideration.max(value);
    }

    pub fn has_considerations_and_importance(&self) -> bool {
        self.considerations_count > 0 && self.importance > 0.0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn nullify(&mut self) {
        self.importance = 0.0;
    }
}

/// Collects actions of one kind and rescales them so that actions scored with
/// fewer considerations are not favoured by having multiplied fewer factors.
#[derive(Debug, Clone, Default)]
pub struct AIProcessor {
    highest_considerations_count: u32,
    actions: Vec<AIAction>,
}

impl AIProcessor {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            highest_considerations_count: 0,
            actions: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.highest_considerations_count = 0;
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn highest_considerations_count(&self) -> u32 {
        self.highest_considerations_count
    }

    pub fn add_action(&mut self, action: AIAction) -> usize {
        let index = self.actions.len();
        self.highest_considerations_count = self
            .highest_considerations_count
            .max(action.considerations_count);
        self.actions.push(action);
        index
    }

    pub fn action_at(&self, index: usize) -> Option<AIAction> {
        self.actions.get(index).copied()
    }

    pub fn set_action_at(&mut self, index: usize, action: AIAction) {
        if let Some(slot) = self.actions.get_mut(index) {
            *slot = action;
            self.highest_considerations_count = self
                .highest_considerations_count
                .max(action.considerations_count);
        }
    }

    /// Zeroes actions without considerations and multiplies every other action
    /// by its own highest consideration once per consideration it lacks
    /// relative to the richest action.
    pub fn compute_final_importances(&mut self) {
        let highest = self.highest_considerations_count;
        for action in &mut self.actions {
            if action.considerations_count == 0 {
                action.importance = 0.0;
            } else if action.considerations_count < highest {
                for _ in action.considerations_count..highest {
                    action.importance *= action.highest_consideration;
                }
            }
        }
    }

    /// Importance at `index`, zero for an unknown index.
    pub fn action_importance(&self, index: usize) -> f32 {
        self.actions
            .get(index)
            .map(|action| action.importance)
            .unwrap_or(0.0)
    }
}
