//! Execution context threaded through model construction, batching and evaluation

use burn::tensor::backend::Backend;

/// Backend the binary trains with: `wgpu` when the feature is compiled in, otherwise the CPU
#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
#[cfg(not(feature = "wgpu"))]
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Whether this build was compiled with an accelerator backend.
///
/// This is a build-time property only: a `wgpu` build on a machine without a usable adapter is
/// left to `wgpu`'s own adapter selection and does not fall back to `ndarray`.
pub fn accelerator_compiled_in() -> bool {
    cfg!(feature = "wgpu")
}

/// The default device of [`DefaultBackend`], logging which kind was picked
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    let device = Default::default();
    if accelerator_compiled_in() {
        log::info!("Accelerator backend compiled in, using device {:?}", device);
    } else {
        log::info!("No accelerator compiled in, using device {:?}", device);
    }
    device
}

/// The device every tensor lives on and the seed all randomness derives from
#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    device: B::Device,
    seed: u64,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(device: B::Device, seed: u64) -> Self {
        Self { device, seed }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seeds the backend's generator, which drives parameter initialization
    pub fn seed_backend(&self) {
        B::seed(self.seed);
    }
}
