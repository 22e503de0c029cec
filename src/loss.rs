//! Loss function(s)

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{Int, Tensor, backend::Backend},
};

use crate::nn::Mlp;

/// Mean cross-entropy between raw class scores and integer labels
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init::<B>(&logits.device())
        .forward(logits, targets)
}

/// Penalty added to the data loss before differentiation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Regularization {
    #[default]
    None,
    /// `coefficient * sum(mean(|p|))` over every parameter tensor `p`
    L1 { coefficient: f64 },
}

impl Regularization {
    pub fn from_l1(coefficient: Option<f64>) -> Self {
        match coefficient {
            Some(coefficient) => Self::L1 { coefficient },
            None => Self::None,
        }
    }

    /// Returns `None` when no penalty applies
    pub fn penalty<B: Backend>(&self, model: &Mlp<B>) -> Option<Tensor<B, 1>> {
        match *self {
            Self::None => None,
            Self::L1 { coefficient } => model
                .parameters()
                .into_iter()
                .map(|param| param.values.abs().mean())
                .reduce(|acc, mean| acc + mean)
                .map(|sum| sum.mul_scalar(coefficient)),
        }
    }

    /// Data loss plus the penalty, if any
    pub fn apply<B: Backend>(&self, loss: Tensor<B, 1>, model: &Mlp<B>) -> Tensor<B, 1> {
        match self.penalty(model) {
            Some(penalty) => loss + penalty,
            None => loss,
        }
    }
}
