use serde::{Deserialize, Serialize};

/// Lifecycle stage of one chart instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisposalState {
    Mounting,
    Ready,
    Disposing,
    Disposed,
}

impl DisposalState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Mounting, Self::Ready) => true,
            (Self::Mounting | Self::Ready, Self::Disposing) => true,
            (Self::Disposing, Self::Disposed) => true,
            (Self::Mounting, Self::Mounting | Self::Disposed)
            | (Self::Ready, Self::Mounting | Self::Ready | Self::Disposed)
            | (Self::Disposing, Self::Mounting | Self::Ready | Self::Disposing)
            | (Self::Disposed, _) => false,
        }
    }

    /// Work scheduled in this state may still run.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Mounting | Self::Ready)
    }

    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::DisposalState::{self, Disposed, Disposing, Mounting, Ready};

    #[test]
    fn only_forward_transitions_are_legal() {
        let all = [Mounting, Ready, Disposing, Disposed];
        let legal: Vec<(DisposalState, DisposalState)> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            legal,
            vec![
                (Mounting, Ready),
                (Mounting, Disposing),
                (Ready, Disposing),
                (Disposing, Disposed),
            ]
        );
    }
}
