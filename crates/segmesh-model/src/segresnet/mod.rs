//! SegResNet: residual encoder-decoder for multi-class volumetric segmentation.
//!
//! Encoder levels double the channel count and halve the resolution; decoder
//! levels halve the channel count, upsample trilinearly and add the matching
//! encoder output. Inputs of any spatial size are accepted: the volume is zero
//! padded to a multiple of `2^(levels - 1)` and the output is cropped back.

pub mod block;
pub mod upsample;

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        Dropout, DropoutConfig, GroupNorm, GroupNormConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

pub use block::{ResBlock, ResBlockConfig};
use upsample::upsample_trilinear;

#[derive(Config, Debug, PartialEq)]
pub struct SegResNetConfig {
    /// Input channels (one per modality)
    #[config(default = "4")]
    pub in_channels: usize,
    /// Output channels (one per class)
    #[config(default = "3")]
    pub out_channels: usize,
    /// Channels of the first level; doubled at every level below
    #[config(default = "16")]
    pub init_filters: usize,
    /// Residual blocks per encoder level
    #[config(default = "vec![1, 2, 2, 4]")]
    pub blocks_down: Vec<usize>,
    /// Residual blocks per decoder level
    #[config(default = "vec![1, 1, 1]")]
    pub blocks_up: Vec<usize>,
    #[config(default = "8")]
    pub norm_groups: usize,
    /// Dropout after the stem; inactive outside autodiff backends
    #[config(default = "0.2")]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct DownLayer<B: Backend> {
    /// Stride-2 convolution, absent on the first level
    downsample: Option<Conv3d<B>>,
    blocks: Vec<ResBlock<B>>,
}

impl<B: Backend> DownLayer<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = match &self.downsample {
            Some(conv) => conv.forward(x),
            None => x,
        };
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UpLayer<B: Backend> {
    /// 1x1x1 convolution halving the channels before upsampling
    reduce: Conv3d<B>,
    blocks: Vec<ResBlock<B>>,
}

#[derive(Module, Debug)]
pub struct SegResNet<B: Backend> {
    stem: Conv3d<B>,
    dropout: Dropout,
    down: Vec<DownLayer<B>>,
    up: Vec<UpLayer<B>>,
    final_norm: GroupNorm<B>,
    final_conv: Conv3d<B>,
    activation: Relu,
}

fn conv3x3(channels: [usize; 2], stride: usize) -> Conv3dConfig {
    Conv3dConfig::new(channels, [3, 3, 3])
        .with_stride([stride; 3])
        .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
        .with_bias(false)
}

impl SegResNetConfig {
    /// Check that the hyperparameters describe a network [`init`](Self::init)
    /// can build.
    ///
    /// Every level's channel count is a multiple of `init_filters`, so
    /// divisibility by `norm_groups` is only checked there. The decoder needs
    /// exactly one level fewer than the encoder to return to full resolution.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            anyhow::bail!(
                "channel counts must be non-zero, got {} in and {} out",
                self.in_channels,
                self.out_channels
            );
        }
        if self.blocks_down.is_empty() {
            anyhow::bail!("at least one encoder level is required");
        }
        if self.blocks_up.len() + 1 != self.blocks_down.len() {
            anyhow::bail!(
                "{} encoder levels need {} decoder levels, got {}",
                self.blocks_down.len(),
                self.blocks_down.len() - 1,
                self.blocks_up.len()
            );
        }
        if self.norm_groups == 0 || self.init_filters == 0 || self.init_filters % self.norm_groups != 0 {
            anyhow::bail!(
                "init_filters ({}) must be a non-zero multiple of norm_groups ({})",
                self.init_filters,
                self.norm_groups
            );
        }
        if !(0.0..1.0).contains(&self.dropout) {
            anyhow::bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SegResNet<B> {
        let filters = self.init_filters;
        let stem = conv3x3([self.in_channels, filters], 1).init(device);

        let down = self
            .blocks_down
            .iter()
            .enumerate()
            .map(|(level, &count)| {
                let channels = filters << level;
                let downsample = (level > 0).then(|| conv3x3([channels / 2, channels], 2).init(device));
                let blocks = (0..count)
                    .map(|_| ResBlockConfig::new(channels, self.norm_groups).init(device))
                    .collect();
                DownLayer { downsample, blocks }
            })
            .collect();

        let levels = self.blocks_up.len();
        let up = self
            .blocks_up
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let channels = filters << (levels - i);
                let reduce = Conv3dConfig::new([channels, channels / 2], [1, 1, 1])
                    .with_bias(false)
                    .init(device);
                let blocks = (0..count)
                    .map(|_| ResBlockConfig::new(channels / 2, self.norm_groups).init(device))
                    .collect();
                UpLayer { reduce, blocks }
            })
            .collect();

        SegResNet {
            stem,
            dropout: DropoutConfig::new(self.dropout).init(),
            down,
            up,
            final_norm: GroupNormConfig::new(self.norm_groups, filters).init(device),
            final_conv: Conv3dConfig::new([filters, self.out_channels], [1, 1, 1]).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> SegResNet<B> {
    /// Spatial sizes the encoder can halve without remainder.
    pub fn size_multiple(&self) -> usize {
        1 << self.down.len().saturating_sub(1)
    }

    /// `[N, C_in, D, H, W]` to `[N, C_out, D, H, W]` logits.
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let [n, _, d, h, w] = input.dims();
        let x = pad_to_multiple(input, self.size_multiple());

        let mut x = self.dropout.forward(self.stem.forward(x));
        let mut skips = Vec::with_capacity(self.down.len());
        for layer in &self.down {
            x = layer.forward(x);
            skips.push(x.clone());
        }
        // The deepest level feeds the decoder directly.
        skips.pop();

        for layer in &self.up {
            x = upsample_trilinear(layer.reduce.forward(x));
            if let Some(skip) = skips.pop() {
                x = x + skip;
            }
            x = layer.blocks.iter().fold(x, |x, block| block.forward(x));
        }

        let x = self.activation.forward(self.final_norm.forward(x));
        let x = self.final_conv.forward(x);

        let channels = x.dims()[1];
        x.slice([0..n, 0..channels, 0..d, 0..h, 0..w])
    }
}

/// Zero pad the spatial dims at the far end up to a multiple of `multiple`.
fn pad_to_multiple<B: Backend>(x: Tensor<B, 5>, multiple: usize) -> Tensor<B, 5> {
    let [n, c, d, h, w] = x.dims();
    let round_up = |v: usize| v.div_ceil(multiple) * multiple;
    let padded = [n, c, round_up(d), round_up(h), round_up(w)];
    if padded == [n, c, d, h, w] {
        return x;
    }
    Tensor::zeros(padded, &x.device()).slice_assign([0..n, 0..c, 0..d, 0..h, 0..w], x)
}
