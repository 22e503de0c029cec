//! The two-layer perceptron classifier

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{Tensor, activation::sigmoid, backend::Backend},
};
use thiserror::Error;

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NNError {
    #[error("Input size mismatch, expected {expected} features but got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error("Hidden unit {unit} is out of range, the layer has {n_units} units")]
    UnitOutOfRange { unit: usize, n_units: usize },
    #[error("Could not read tensor data: {0}")]
    TensorData(String),
}

/// Shape of the perceptron: `d_input -> d_hidden (sigmoid) -> num_classes`
#[derive(Config, Debug)]
pub struct MlpConfig {
    #[config(default = 784)]
    pub d_input: usize,
    #[config(default = 128)]
    pub d_hidden: usize,
    #[config(default = 10)]
    pub num_classes: usize,
}

impl MlpConfig {
    /// Creates a model with randomly initialized parameters on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            hidden: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            output: LinearConfig::new(self.d_hidden, self.num_classes).init(device),
        }
    }
}

/// A NN with one sigmoid hidden layer, the output is a vector of raw class scores (logits)
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Linear<B>,
    output: Linear<B>,
}

/// A parameter tensor flattened to rank 1, tagged with its path in the model
#[derive(Debug, Clone)]
pub struct NamedParameter<B: Backend> {
    pub name: &'static str,
    pub values: Tensor<B, 1>,
}

impl<B: Backend> Mlp<B> {
    /// Maps a `[batch, d_input]` tensor of features to `[batch, num_classes]` logits
    pub fn forward(&self, features: Tensor<B, 2>) -> Result<Tensor<B, 2>, NNError> {
        let expected = self.d_input();
        let [_, got] = features.dims();
        if got != expected {
            return Err(NNError::InputSizeMismatch { expected, got });
        }
        let x = self.hidden.forward(features);
        let x = sigmoid(x);
        Ok(self.output.forward(x))
    }

    pub fn d_input(&self) -> usize {
        self.hidden.weight.val().dims()[0]
    }

    pub fn d_hidden(&self) -> usize {
        self.hidden.weight.val().dims()[1]
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight.val().dims()[1]
    }

    /// Every learnable tensor of the model, in a fixed order
    pub fn parameters(&self) -> Vec<NamedParameter<B>> {
        let mut params = Vec::with_capacity(4);
        let layers = [
            ("hidden.weight", "hidden.bias", &self.hidden),
            ("output.weight", "output.bias", &self.output),
        ];
        for (weight_name, bias_name, linear) in layers {
            params.push(NamedParameter {
                name: weight_name,
                values: linear.weight.val().flatten::<1>(0, 1),
            });
            if let Some(bias) = &linear.bias {
                params.push(NamedParameter {
                    name: bias_name,
                    values: bias.val(),
                });
            }
        }
        params
    }

    /// The incoming weights of a single hidden unit, one per input feature
    pub fn hidden_unit_weights(&self, unit: usize) -> Result<Vec<f32>, NNError> {
        let n_units = self.d_hidden();
        if unit >= n_units {
            return Err(NNError::UnitOutOfRange { unit, n_units });
        }
        let weights = self
            .hidden
            .weight
            .val()
            .slice([0..self.d_input(), unit..unit + 1]);
        weights
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| NNError::TensorData(format!("{err:?}")))
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    use super::*;

    type TestBackend = NdArray;

    fn to_vec<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_output_width_independent_of_batch_size() {
        let device = NdArrayDevice::Cpu;
        let model = MlpConfig::new().init::<TestBackend>(&device);
        for batch_size in [1, 7, 256] {
            let inputs = Tensor::<TestBackend, 2>::zeros([batch_size, 784], &device);
            let logits = model.forward(inputs).unwrap();
            assert_eq!(logits.dims(), [batch_size, 10]);
        }
    }

    #[test]
    fn test_dim_mismatch() {
        let device = NdArrayDevice::Cpu;
        let model = MlpConfig::new().init::<TestBackend>(&device);
        let inputs = Tensor::<TestBackend, 2>::zeros([4, 783], &device);
        let err = model.forward(inputs).unwrap_err();
        assert!(matches!(
            err,
            NNError::InputSizeMismatch {
                expected: 784,
                got: 783
            }
        ));
    }

    #[test]
    fn test_forward_matches_manual_computation() {
        let device = NdArrayDevice::Cpu;
        let model = MlpConfig::new()
            .with_d_input(3)
            .with_d_hidden(4)
            .with_num_classes(2)
            .init::<TestBackend>(&device);
        let inputs = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.5, 0.9]], &device);

        let hidden = inputs
            .clone()
            .matmul(model.hidden.weight.val())
            .add(model.hidden.bias.as_ref().unwrap().val().unsqueeze::<2>());
        let expected = sigmoid(hidden)
            .matmul(model.output.weight.val())
            .add(model.output.bias.as_ref().unwrap().val().unsqueeze::<2>());

        let got = to_vec(model.forward(inputs).unwrap());
        let expected = to_vec(expected);
        assert_eq!(got.len(), 2);
        for (a, b) in got.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_parameters_registry() {
        let device = NdArrayDevice::Cpu;
        let model = MlpConfig::new().init::<TestBackend>(&device);
        let params = model.parameters();
        let names: Vec<_> = params.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            ["hidden.weight", "hidden.bias", "output.weight", "output.bias"]
        );
        let sizes: Vec<_> = params.iter().map(|p| p.values.dims()[0]).collect();
        assert_eq!(sizes, [784 * 128, 128, 128 * 10, 10]);
    }

    #[test]
    fn test_hidden_unit_weights() {
        let device = NdArrayDevice::Cpu;
        let model = MlpConfig::new().init::<TestBackend>(&device);
        let weights = model.hidden_unit_weights(3).unwrap();
        assert_eq!(weights.len(), 784);

        // column 3 of the [784, 128] weight matrix
        let all = to_vec(model.hidden.weight.val());
        assert_eq!(weights[0], all[3]);
        assert_eq!(weights[1], all[128 + 3]);

        assert!(matches!(
            model.hidden_unit_weights(128),
            Err(NNError::UnitOutOfRange {
                unit: 128,
                n_units: 128
            })
        ));
    }
}
