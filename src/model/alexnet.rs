//! AlexNet Architecture for Facial Emotion Classification
//!
//! Five convolutional layers (the first two followed by local response
//! normalization), three max-pools and three fully connected layers with
//! dropout, producing logits for the six emotion classes.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the AlexNet model
#[derive(Config, Debug)]
pub struct AlexNetConfig {
    /// Number of output classes
    #[config(default = "6")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "150")]
    pub input_size: usize,

    /// Probability of keeping a unit in the fully connected dropout layers
    #[config(default = "0.5")]
    pub keep_prob: f64,

    #[config(default = "96")]
    pub conv1_filters: usize,
    #[config(default = "256")]
    pub conv2_filters: usize,
    #[config(default = "384")]
    pub conv3_filters: usize,
    #[config(default = "384")]
    pub conv4_filters: usize,
    #[config(default = "256")]
    pub conv5_filters: usize,

    /// Width of fc6 and fc7
    #[config(default = "4096")]
    pub fc_units: usize,

    /// Half-width of the LRN channel window
    #[config(default = "2")]
    pub lrn_depth_radius: usize,
    #[config(default = "1.0")]
    pub lrn_bias: f64,
    #[config(default = "2e-5")]
    pub lrn_alpha: f64,
    #[config(default = "0.75")]
    pub lrn_beta: f64,
}

impl AlexNetConfig {
    /// Spatial side of the conv5 feature map, `None` if the input is too small
    pub fn feature_map_size(&self) -> Option<usize> {
        let conv = |size: usize, kernel: usize, stride: usize, pad: usize| {
            (size + 2 * pad).checked_sub(kernel).map(|s| s / stride + 1)
        };
        let pool = |size: usize| size.checked_sub(3).map(|s| s / 2 + 1);

        let s = conv(self.input_size, 11, 4, 2)?;
        let s = pool(s)?;
        let s = conv(s, 5, 1, 2)?;
        let s = pool(s)?;
        let s = conv(s, 3, 1, 1)?;
        pool(s)
    }

    /// Length of the flattened conv5 output fed to fc6
    pub fn flattened_features(&self) -> Option<usize> {
        self.feature_map_size()
            .map(|s| s * s * self.conv5_filters)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err("keep_prob must be in range (0.0, 1.0]".to_string());
        }
        match self.feature_map_size() {
            Some(s) if s > 0 => Ok(()),
            _ => Err(format!("input_size {} is too small", self.input_size)),
        }
    }
}

/// TensorFlow-style local response normalization across channels
///
/// `x / (bias + alpha * sum(x^2 over [c - r, c + r]))^beta`
pub fn local_response_norm<B: Backend>(
    x: Tensor<B, 4>,
    depth_radius: usize,
    bias: f64,
    alpha: f64,
    beta: f64,
) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    let squared = x.clone().powf_scalar(2.0);

    let window_sum = if depth_radius == 0 {
        squared
    } else {
        let pad = Tensor::<B, 4>::zeros([n, depth_radius, h, w], &x.device());
        let padded = Tensor::cat(vec![pad.clone(), squared, pad], 1);
        let mut sum = padded.clone().slice([0..n, 0..c, 0..h, 0..w]);
        for offset in 1..=2 * depth_radius {
            sum = sum + padded.clone().slice([0..n, offset..offset + c, 0..h, 0..w]);
        }
        sum
    };

    x / window_sum.mul_scalar(alpha).add_scalar(bias).powf_scalar(beta)
}

/// AlexNet emotion classifier
#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,
    pool: MaxPool2d,
    relu: Relu,

    pub fc6: Linear<B>,
    pub fc7: Linear<B>,
    pub fc8: Linear<B>,
    dropout: Dropout,

    lrn_depth_radius: usize,
    lrn_bias: f64,
    lrn_alpha: f64,
    lrn_beta: f64,
    num_classes: usize,
}

impl<B: Backend> AlexNet<B> {
    /// Create a new AlexNet from configuration
    ///
    /// The input size must leave a non-empty conv5 feature map; call
    /// [`AlexNetConfig::validate`] first for user-provided configs.
    pub fn new(config: &AlexNetConfig, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, config.conv1_filters], [11, 11])
            .with_stride([4, 4])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .init(device);
        let conv2 = Conv2dConfig::new([config.conv1_filters, config.conv2_filters], [5, 5])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .init(device);
        let conv3 = Conv2dConfig::new([config.conv2_filters, config.conv3_filters], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv4 = Conv2dConfig::new([config.conv3_filters, config.conv4_filters], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv5 = Conv2dConfig::new([config.conv4_filters, config.conv5_filters], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let pool = MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init();

        let flattened = config.flattened_features().unwrap_or(config.conv5_filters);
        let fc6 = LinearConfig::new(flattened, config.fc_units).init(device);
        let fc7 = LinearConfig::new(config.fc_units, config.fc_units).init(device);
        let fc8 = LinearConfig::new(config.fc_units, config.num_classes).init(device);
        let dropout = DropoutConfig::new(1.0 - config.keep_prob).init();

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            conv5,
            pool,
            relu: Relu::new(),
            fc6,
            fc7,
            fc8,
            dropout,
            lrn_depth_radius: config.lrn_depth_radius,
            lrn_bias: config.lrn_bias,
            lrn_alpha: config.lrn_alpha,
            lrn_beta: config.lrn_beta,
            num_classes: config.num_classes,
        }
    }

    fn lrn(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        local_response_norm(
            x,
            self.lrn_depth_radius,
            self.lrn_bias,
            self.lrn_alpha,
            self.lrn_beta,
        )
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.pool.forward(self.lrn(x));

        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(self.lrn(x));

        let x = self.relu.forward(self.conv3.forward(x));
        let x = self.relu.forward(self.conv4.forward(x));
        let x = self.relu.forward(self.conv5.forward(x));
        let x = self.pool.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.dropout.forward(self.relu.forward(self.fc6.forward(x)));
        let x = self.dropout.forward(self.relu.forward(self.fc7.forward(x)));
        self.fc8.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    /// `sum(w^2) / 2` over the conv1-5 and fc6-8 kernels, biases excluded
    pub fn weight_l2(&self) -> Tensor<B, 1> {
        let convs = [&self.conv1, &self.conv2, &self.conv3, &self.conv4, &self.conv5]
            .map(|conv| conv.weight.val().powf_scalar(2.0).sum());
        let fcs = [&self.fc6, &self.fc7, &self.fc8].map(|fc| fc.weight.val().powf_scalar(2.0).sum());

        Tensor::cat(convs.into_iter().chain(fcs).collect(), 0)
            .sum()
            .div_scalar(2.0)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
