use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        GroupNorm, GroupNormConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

/// Pre-activation residual block: two `norm -> relu -> conv3x3` stages plus identity.
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    norm1: GroupNorm<B>,
    conv1: Conv3d<B>,
    norm2: GroupNorm<B>,
    conv2: Conv3d<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ResBlockConfig {
    pub channels: usize,
    pub norm_groups: usize,
}

impl ResBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResBlock<B> {
        let conv = || {
            Conv3dConfig::new([self.channels, self.channels], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .with_bias(false)
                .init(device)
        };
        ResBlock {
            norm1: GroupNormConfig::new(self.norm_groups, self.channels).init(device),
            conv1: conv(),
            norm2: GroupNormConfig::new(self.norm_groups, self.channels).init(device),
            conv2: conv(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ResBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let identity = x.clone();
        let x = self.conv1.forward(self.activation.forward(self.norm1.forward(x)));
        let x = self.conv2.forward(self.activation.forward(self.norm2.forward(x)));
        x + identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_block_keeps_shape() {
        let device = Default::default();
        let block = ResBlockConfig::new(8, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::random([1, 8, 4, 5, 6], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 4, 5, 6]);
    }
}
