//! Queue-fed training driver
//!
//! Loader workers keep a bounded queue of preprocessed examples full while
//! the main thread runs momentum SGD on AlexNet. Progress is logged every
//! `display_step` steps; every `test_step` steps the fixed validation batch
//! is scored and the checkpoint overwritten.

use std::time::Instant;

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer,
        SgdConfig,
    },
    tensor::{
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use super::checkpoint::{
    load_checkpoint, save_checkpoint, state_path, TrainingState, MODEL_CONFIG_FILE,
    TRAINING_CONFIG_FILE,
};
use super::scheduler::LRScheduler;
use crate::dataset::{read_batch, EmotionBatch, EmotionBatcher, EmotionDataset, LoaderPool};
use crate::model::{AlexNet, AlexNetConfig, TrainingConfig};
use crate::utils::error::{EmotionError, Result};
use crate::utils::{format_time, MetricKind, MetricRecord, MetricsWriter};

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub global_step: usize,
    pub elapsed_secs: f64,
    pub last_validation_accuracy: Option<f64>,
    pub checkpoint: std::path::PathBuf,
}

/// Mean softmax cross-entropy against one-hot targets
pub fn softmax_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (log_softmax(logits, 1) * targets).sum_dim(1).neg().mean()
}

/// Cross-entropy plus `weight_decay * weight_l2`, the quantity reported as "Loss"
///
/// The optimizer applies weight decay to the gradients itself; this value is
/// only logged.
pub fn regularized_loss<B: Backend>(
    model: &AlexNet<B>,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weight_decay: f64,
) -> f64 {
    let cross_entropy: f64 = softmax_cross_entropy(logits, targets).into_scalar().elem();
    let l2: f64 = model.weight_l2().into_scalar().elem();
    cross_entropy + weight_decay * l2
}

/// Fraction of rows whose arg-max logit matches the one-hot target
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> f64 {
    let [n, _] = logits.dims();
    if n == 0 {
        return 0.0;
    }
    let predictions = logits.argmax(1).reshape([n]);
    let truth = targets.argmax(1).reshape([n]);
    let correct: i64 = predictions.equal(truth).int().sum().into_scalar().elem();
    correct as f64 / n as f64
}

/// Accuracy over a dataset, scored in chunks
pub fn evaluate_accuracy<B: Backend>(
    model: &AlexNet<B>,
    dataset: &EmotionDataset,
    batcher: &EmotionBatcher,
    chunk_size: usize,
    device: &B::Device,
) -> f64 {
    let mut correct = 0.0;
    let mut total = 0usize;

    for chunk in dataset.chunks(chunk_size) {
        let batch: EmotionBatch<B> = batcher.batch(chunk.to_vec(), device);
        let logits = model.forward(batch.images);
        correct += accuracy(logits, batch.targets) * chunk.len() as f64;
        total += chunk.len();
    }

    if total == 0 {
        0.0
    } else {
        correct / total as f64
    }
}

/// Momentum SGD with weight decay, as configured
pub fn build_optimizer<B: AutodiffBackend>(
    config: &TrainingConfig,
) -> impl Optimizer<AlexNet<B>, B> {
    let momentum = MomentumConfig::new()
        .with_momentum(config.momentum)
        .with_dampening(0.0);

    SgdConfig::new()
        .with_momentum(Some(momentum))
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init()
}

/// Learning-rate schedule described by the config
pub fn build_scheduler(config: &TrainingConfig) -> LRScheduler {
    if config.decay_steps.is_empty() {
        LRScheduler::constant(config.learning_rate)
    } else {
        LRScheduler::step_decay(
            config.learning_rate,
            config.decay_factor,
            config.decay_steps.clone(),
        )
    }
}

/// Train the full-size network described by `config`
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    run_training_with_model::<B>(config, &config.model_config(), device)
}

/// Train with an explicit model configuration
pub fn run_training_with_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    model_config: &AlexNetConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    model_config.validate().map_err(EmotionError::Config)?;

    println!("{}", "Initializing Training...".green().bold());
    std::fs::create_dir_all(&config.ckpt_path)?;
    config.save_json(&config.ckpt_path.join(TRAINING_CONFIG_FILE))?;
    model_config.save(config.ckpt_path.join(MODEL_CONFIG_FILE))?;

    let num_batches = config.num_batches();
    let scheduler = build_scheduler(config);

    let model = AlexNet::<B>::new(model_config, device);
    let optimizer = build_optimizer::<B>(config);

    let (model, optimizer, global_step) = if config.resume {
        if !state_path(&config.ckpt_path).exists() {
            return Err(EmotionError::Checkpoint(format!(
                "resume requested but no checkpoint in {}",
                config.ckpt_path.display()
            )));
        }
        let (model, optimizer, state) =
            load_checkpoint(&config.ckpt_path, model, optimizer, device)?;
        (model, optimizer, state.global_step)
    } else {
        (model, optimizer, 0)
    };

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  📂 Training data:     {:?}", config.train_dir);
    println!("  🔄 Epochs:            {}", config.epochs);
    println!("  📦 Batch size:        {}", config.batch_size);
    println!("  🔢 Batches per epoch: {}", num_batches);
    println!("  📈 Learning rate:     {:e}", scheduler.get_lr(global_step));
    println!("  🎯 Keep probability:  {}", model_config.keep_prob);
    println!("  ⏩ Starting step:     {}", global_step);
    println!();

    let mut valid_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let valid_items = read_batch(
        config.valid_batch_size,
        &config.eval_dir,
        &config.class_names,
        config.image_size,
        &mut valid_rng,
    )?;
    info!("Validation batch: {} examples", valid_items.len());
    let valid_dataset = EmotionDataset::new(valid_items);

    let pool = LoaderPool::from_directory(
        config.train_dir.clone(),
        config.class_names.clone(),
        config.batch_size,
        config.image_size,
        config.num_threads,
        config.seed.wrapping_add(1),
    )?;

    let loop_result = train_loop(
        config,
        &scheduler,
        model,
        optimizer,
        global_step,
        &pool,
        &valid_dataset,
        device,
    );
    let shutdown_result = pool.shutdown();

    match (loop_result, shutdown_result) {
        (Ok(summary), Ok(())) => {
            println!("{}", "Training Complete!".green().bold());
            println!("  💾 Checkpoint: {:?}", summary.checkpoint);
            println!("  ⏱️  Elapsed:    {}", format_time(summary.elapsed_secs));
            Ok(summary)
        }
        // The queue closes because a worker died; its error is the real cause
        (Err(EmotionError::QueueClosed), Err(worker_err)) => Err(worker_err),
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn train_loop<B, O>(
    config: &TrainingConfig,
    scheduler: &LRScheduler,
    mut model: AlexNet<B>,
    mut optimizer: O,
    mut global_step: usize,
    pool: &LoaderPool,
    valid_dataset: &EmotionDataset,
    device: &B::Device,
) -> Result<TrainingSummary>
where
    B: AutodiffBackend,
    O: Optimizer<AlexNet<B>, B>,
{
    let batcher = EmotionBatcher::new(config.image_size as usize);
    let mut metrics = MetricsWriter::create(&config.summary_path)?;
    let num_batches = config.num_batches();
    let start_epoch = global_step / num_batches;
    let start = Instant::now();
    let mut last_validation = None;
    let mut epoch = start_epoch;

    if start_epoch >= config.epochs {
        warn!(
            "Checkpoint at step {} already covers {} epochs",
            global_step, config.epochs
        );
    }

    for e in start_epoch..config.epochs {
        epoch = e;
        for _ in 0..num_batches {
            let lr = scheduler.get_lr(global_step);
            let items = pool.next_batch(config.batch_size)?;
            let batch: EmotionBatch<B> = batcher.batch(items, device);

            let logits = model.forward(batch.images.clone());
            let loss = softmax_cross_entropy(logits, batch.targets.clone());
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(lr, model, grads);
            global_step += 1;

            if scheduler.is_boundary(global_step) {
                info!(
                    "Learning rate decayed to {:e} at step {}",
                    scheduler.get_lr(global_step),
                    global_step
                );
            }

            if global_step % config.display_step == 0 {
                // dropout disabled
                let eval_model = model.valid();
                let logits = eval_model.forward(batch.images.inner());
                let targets = batch.targets.inner();
                let loss = regularized_loss(
                    &eval_model,
                    logits.clone(),
                    targets.clone(),
                    config.weight_decay,
                );
                let acc = accuracy(logits, targets);

                info!(
                    "Epoch: {:03} Step/Batch: {:09} --- Loss: {:.7} Training accuracy: {:.4}",
                    e, global_step, loss, acc
                );
                metrics.record(&MetricRecord {
                    step: global_step,
                    epoch: e,
                    kind: MetricKind::Train,
                    loss: Some(loss),
                    accuracy: acc,
                    learning_rate: lr,
                })?;
            }

            if global_step % config.test_step == 0 {
                let acc = evaluate_accuracy(
                    &model.valid(),
                    valid_dataset,
                    &batcher,
                    config.batch_size,
                    device,
                );
                last_validation = Some(acc);

                info!("Elapsed time: {}", format_time(start.elapsed().as_secs_f64()));
                info!("Validation accuracy: {:.4}", acc);
                metrics.record(&MetricRecord {
                    step: global_step,
                    epoch: e,
                    kind: MetricKind::Validation,
                    loss: None,
                    accuracy: acc,
                    learning_rate: lr,
                })?;

                let state = TrainingState::new(
                    global_step,
                    scheduler.get_lr(global_step),
                    e,
                    last_validation,
                );
                let path = save_checkpoint(&config.ckpt_path, &model, &optimizer, &state)?;
                info!("Model checkpoint saved at {:?}", path);
            }
        }
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    info!("Optimization finished! Elapsed time: {}", format_time(elapsed_secs));

    let state = TrainingState::new(
        global_step,
        scheduler.get_lr(global_step),
        epoch,
        last_validation,
    );
    let checkpoint = save_checkpoint(&config.ckpt_path, &model, &optimizer, &state)?;
    info!("Model checkpoint saved at {:?}", checkpoint);

    Ok(TrainingSummary {
        global_step,
        elapsed_secs,
        last_validation_accuracy: last_validation,
        checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::make_class_tree;
    use crate::inference::Predictor;
    use crate::model::alexnet::tests::tiny_config;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn tensor2(values: Vec<f32>, rows: usize) -> Tensor<TestBackend, 2> {
        let cols = values.len() / rows;
        Tensor::from_floats(TensorData::new(values, [rows, cols]), &Default::default())
    }

    #[test]
    fn test_accuracy() {
        let logits = tensor2(vec![2.0, 1.0, 0.0, 0.0, 3.0, 1.0], 2);
        let targets = tensor2(vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0], 2);
        assert!((accuracy(logits, targets) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let logits = tensor2(vec![0.0; 6], 1);
        let targets = tensor2(vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0], 1);
        let loss: f64 = softmax_cross_entropy(logits, targets).into_scalar().elem();
        assert!((loss - (6.0f64).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_regularized_loss_adds_weight_penalty() {
        let device = Default::default();
        let model = AlexNet::<TestBackend>::new(&tiny_config(), &device);
        let logits = tensor2(vec![0.0; 6], 1);
        let targets = tensor2(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1);
        let l2: f64 = model.weight_l2().into_scalar().elem();

        let plain = regularized_loss(&model, logits.clone(), targets.clone(), 0.0);
        assert!((plain - (6.0f64).ln()).abs() < 1e-5);

        let decayed = regularized_loss(&model, logits, targets, 5e-4);
        assert!((decayed - plain - 5e-4 * l2).abs() < 1e-5);
        assert!(decayed > plain);
    }

    #[test]
    fn test_build_scheduler() {
        let config = TrainingConfig::default();
        assert_eq!(
            build_scheduler(&config),
            LRScheduler::step_decay(1e-3, 0.1, vec![170_000, 350_000])
        );
        let constant = TrainingConfig {
            decay_steps: vec![],
            ..Default::default()
        };
        assert_eq!(build_scheduler(&constant), LRScheduler::constant(1e-3));
    }

    fn tiny_training_config(root: &std::path::Path) -> TrainingConfig {
        TrainingConfig {
            epochs: 2,
            batch_size: 6,
            keep_prob: 1.0,
            display_step: 1,
            test_step: 2,
            ckpt_path: root.join("ckpt"),
            summary_path: root.join("summary"),
            train_dir: root.join("train"),
            eval_dir: root.join("train"),
            num_images: 12,
            valid_batch_size: 1,
            num_threads: 2,
            image_size: 67,
            ..Default::default()
        }
    }

    #[test]
    fn test_tiny_run_and_resume() {
        let dir = TempDir::new().unwrap();
        make_class_tree(&dir.path().join("train"), 2);
        let device = Default::default();
        let model_config = tiny_config().with_keep_prob(1.0);

        let config = tiny_training_config(dir.path());
        let summary =
            run_training_with_model::<TestAutodiffBackend>(&config, &model_config, &device)
                .unwrap();
        assert_eq!(summary.global_step, 4);
        assert!(summary.last_validation_accuracy.is_some());

        let state = TrainingState::load(&state_path(&config.ckpt_path)).unwrap();
        assert_eq!(state.global_step, 4);

        let metrics = std::fs::read_to_string(
            config.summary_path.join("train").join("metrics.csv"),
        )
        .unwrap();
        // header + 4 train rows + 2 validation rows
        assert_eq!(metrics.lines().count(), 7);

        // inference rebuilds the 67x67 network from the recorded architecture
        let predictor =
            Predictor::<TestBackend>::from_checkpoint(&config.ckpt_path, &device).unwrap();
        assert_eq!(predictor.image_size(), 67);
        let probs = predictor.predict(&[vec![0.5f32; 3 * 67 * 67]]).unwrap();
        assert!((probs[0].iter().sum::<f32>() - 1.0).abs() < 1e-4);

        let resumed = TrainingConfig {
            epochs: 3,
            resume: true,
            ..config
        };
        let summary =
            run_training_with_model::<TestAutodiffBackend>(&resumed, &model_config, &device)
                .unwrap();
        assert_eq!(summary.global_step, 6);
    }

    #[test]
    fn test_missing_class_dir_surfaces_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("train")).unwrap();
        let config = tiny_training_config(dir.path());

        let result = run_training_with_model::<TestAutodiffBackend>(
            &config,
            &tiny_config(),
            &Default::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resume_without_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let config = TrainingConfig {
            resume: true,
            ..tiny_training_config(dir.path())
        };
        assert!(matches!(
            run_training_with_model::<TestAutodiffBackend>(
                &config,
                &tiny_config(),
                &Default::default()
            ),
            Err(EmotionError::Checkpoint(_))
        ));
    }
}
