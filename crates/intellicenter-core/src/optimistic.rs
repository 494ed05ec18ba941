// ── Optimistic values ──
//
// Application-side state for a value the user just changed. Until the
// controller confirms, readers see the requested value; the first real
// update for the attribute replaces it, whatever it says.

/// A value that may be temporarily overridden by a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticValue<T> {
    /// Last value reported by the controller.
    Real(T),
    /// A change was requested; `requested` is shown until confirmed.
    Pending { real: T, requested: T },
}

impl<T: Clone> OptimisticValue<T> {
    pub fn new(real: T) -> Self {
        Self::Real(real)
    }

    /// The value readers should display.
    pub fn value(&self) -> &T {
        match self {
            Self::Real(value) | Self::Pending { requested: value, .. } => value,
        }
    }

    /// The last value the controller reported.
    pub fn real(&self) -> &T {
        match self {
            Self::Real(value) | Self::Pending { real: value, .. } => value,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Record a requested change.
    pub fn request(&mut self, requested: T) {
        let real = self.real().clone();
        *self = Self::Pending { real, requested };
    }

    /// Apply a value reported by the controller, clearing any pending request.
    pub fn confirm(&mut self, real: T) {
        *self = Self::Real(real);
    }

    /// Drop a pending request (e.g. it failed) and fall back to the real value.
    pub fn revert(&mut self) {
        let real = self.real().clone();
        *self = Self::Real(real);
    }
}
