// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in dense network backend for SafeTensors files.
//!
//! A model is a sequence of fully connected layers stored as
//! `layers.{i}.weight` (`[in, out]`, f32) and optional `layers.{i}.bias`
//! (`[out]`, f32). The SafeTensors `__metadata__` block may declare:
//!
//! | key                  | default   |                                    |
//! |----------------------|-----------|------------------------------------|
//! | `activation`         | `relu`    | between hidden layers              |
//! | `output_activation`  | `none`    | after the last layer               |
//! | `input_name`         | `input`   |                                    |
//! | `input_dtype`        | `f32`     | `int8` / `uint8` for quantized     |
//! | `input_scale`        | -         | quantization scale                 |
//! | `input_zero_point`   | `0`       |                                    |
//! | `output_name`, `output_dtype`, `output_scale`, `output_zero_point`   | |
//!
//! Only the header is parsed through the memory map; weights are copied
//! into owned tensors so the file can be closed after loading.

use std::collections::HashMap;
use std::path::Path;

use safetensors::SafeTensors;
use tensor_core::{
    add_bias, matmul, Activation, DType, Quantization, Shape, Tensor, TensorData, TensorSpec,
};

use super::{BackendProvider, ModelHandle, ModelSignature};
use crate::{BackendError, BackendKind, Device};

/// Provider for the built-in dense executor. CPU only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProvider;

impl BackendProvider for NativeProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn load(&self, path: &Path, device: Device) -> Result<Box<dyn ModelHandle>, BackendError> {
        if device != Device::Cpu {
            return Err(BackendError::DeviceUnsupported {
                backend: BackendKind::Native,
                device,
            });
        }
        Ok(Box::new(DenseModel::load(path)?))
    }
}

#[derive(Debug)]
struct DenseLayer {
    weight: Tensor,
    bias: Option<Vec<f32>>,
}

impl DenseLayer {
    fn in_features(&self) -> usize {
        self.weight.shape().dims()[0]
    }

    fn out_features(&self) -> usize {
        self.weight.shape().dims()[1]
    }
}

/// A loaded stack of dense layers.
#[derive(Debug)]
pub struct DenseModel {
    layers: Vec<DenseLayer>,
    hidden_activation: Activation,
    output_activation: Activation,
    signature: ModelSignature,
}

impl DenseModel {
    /// Reads a dense model from a SafeTensors file.
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let file = std::fs::File::open(path).map_err(|e| {
            BackendError::Load(format!("cannot open '{}': {e}", path.display()))
        })?;

        // SAFETY: the map is read-only and dropped before this function returns.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| BackendError::Load(format!("mmap failed: {e}")))?;

        let (_, header) = SafeTensors::read_metadata(&mmap)
            .map_err(|e| BackendError::Load(format!("SafeTensors parse error: {e}")))?;
        let metadata = header.metadata().clone().unwrap_or_default();
        let tensors = SafeTensors::deserialize(&mmap)
            .map_err(|e| BackendError::Load(format!("SafeTensors parse error: {e}")))?;

        let mut layers = Vec::new();
        while let Ok(view) = tensors.tensor(&format!("layers.{}.weight", layers.len())) {
            let i = layers.len();
            let weight = read_f32(&format!("layers.{i}.weight"), &view)?;
            if weight.shape().rank() != 2 {
                return Err(BackendError::Load(format!(
                    "layers.{i}.weight must be 2-D, got {}",
                    weight.shape()
                )));
            }
            let bias = match tensors.tensor(&format!("layers.{i}.bias")) {
                Ok(view) => {
                    let bias = read_f32(&format!("layers.{i}.bias"), &view)?;
                    if bias.shape().num_elements() != weight.shape().dims()[1] {
                        return Err(BackendError::Load(format!(
                            "layers.{i}.bias has {} elements, expected {}",
                            bias.shape().num_elements(),
                            weight.shape().dims()[1]
                        )));
                    }
                    Some(bias.as_f32_slice()?.to_vec())
                }
                Err(_) => None,
            };
            layers.push(DenseLayer { weight, bias });
        }

        if layers.is_empty() {
            return Err(BackendError::Load(
                "no dense layers found (expected 'layers.0.weight')".to_string(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].out_features() != pair[1].in_features() {
                return Err(BackendError::Load(format!(
                    "layer {i} produces {} features but layer {} expects {}",
                    pair[0].out_features(),
                    i + 1,
                    pair[1].in_features()
                )));
            }
        }

        let hidden_activation = activation(&metadata, "activation", Activation::Relu)?;
        let output_activation = activation(&metadata, "output_activation", Activation::None)?;

        let in_features = layers[0].in_features();
        let out_features = layers[layers.len() - 1].out_features();
        let signature = ModelSignature {
            inputs: vec![tensor_spec(&metadata, "input", in_features)?],
            outputs: vec![tensor_spec(&metadata, "output", out_features)?],
        };

        tracing::debug!(
            "native: loaded {} dense layers from {} ({in_features} -> {out_features})",
            layers.len(),
            path.display(),
        );

        Ok(Self {
            layers,
            hidden_activation,
            output_activation,
            signature,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl ModelHandle for DenseModel {
    fn describe(&self) -> &ModelSignature {
        &self.signature
    }

    fn infer(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError> {
        let in_features = self.layers[0].in_features();
        let dims = input.shape().dims();
        let batch = dims.first().copied().unwrap_or(1);
        let features: usize = dims.iter().skip(1).product();
        if dims.len() < 2 || features != in_features {
            return Err(BackendError::InvalidInput(format!(
                "expected [batch, {in_features}], got {}",
                input.shape()
            )));
        }

        let input_spec = &self.signature.inputs[0];
        let values: Vec<f32> = match input_spec.active_quantization() {
            Some(q) if input.dtype().is_integer() => input
                .data()
                .to_f64_vec()
                .into_iter()
                .map(|v| q.dequantize(v) as f32)
                .collect(),
            _ => input.data().to_f32_vec(),
        };

        let mut activations = Tensor::from_f32(Shape::matrix(batch, in_features), &values)?;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let mut out = Tensor::zeros(Shape::matrix(batch, layer.out_features()), DType::F32);
            matmul(&activations.view(), &layer.weight.view(), &mut out)?;
            if let Some(bias) = &layer.bias {
                add_bias(&mut out, bias)?;
            }
            let act = if i == last {
                self.output_activation
            } else {
                self.hidden_activation
            };
            act.apply(&mut out)?;
            activations = out;
        }

        let output_spec = &self.signature.outputs[0];
        if output_spec.dtype == DType::F32 {
            return Ok(vec![activations]);
        }
        let floats = activations.as_f32_slice()?;
        let values: Vec<f64> = match output_spec.active_quantization() {
            Some(q) => floats.iter().map(|&x| q.quantize(x as f64)).collect(),
            None => floats.iter().map(|&x| x as f64).collect(),
        };
        let data = TensorData::from_f64(output_spec.dtype, &values);
        Ok(vec![Tensor::new(activations.shape().clone(), data)?])
    }
}

/// Copies an f32 SafeTensors entry into an owned tensor.
fn read_f32(name: &str, view: &safetensors::tensor::TensorView<'_>) -> Result<Tensor, BackendError> {
    if view.dtype() != safetensors::Dtype::F32 {
        return Err(BackendError::Load(format!(
            "'{name}' must be F32, got {:?}",
            view.dtype()
        )));
    }
    let values: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Tensor::from_f32(Shape::new(view.shape().to_vec()), &values)?)
}

fn activation(
    metadata: &HashMap<String, String>,
    key: &str,
    default: Activation,
) -> Result<Activation, BackendError> {
    match metadata.get(key) {
        None => Ok(default),
        Some(name) => Activation::parse(name)
            .ok_or_else(|| BackendError::Load(format!("unknown {key} '{name}'"))),
    }
}

/// Builds the `[?, features]` spec for `prefix` ("input" or "output").
fn tensor_spec(
    metadata: &HashMap<String, String>,
    prefix: &str,
    features: usize,
) -> Result<TensorSpec, BackendError> {
    let get = |suffix: &str| metadata.get(&format!("{prefix}_{suffix}"));

    let name = get("name").cloned().unwrap_or_else(|| prefix.to_string());
    let dtype = match get("dtype") {
        Some(s) => s.parse::<DType>().map_err(BackendError::Load)?,
        None => DType::F32,
    };
    let mut spec = TensorSpec::new(name, vec![None, Some(features)], dtype);

    if let Some(scale) = get("scale") {
        let scale: f32 = scale
            .parse()
            .map_err(|e| BackendError::Load(format!("bad {prefix}_scale '{scale}': {e}")))?;
        let zero_point: i32 = match get("zero_point") {
            Some(zp) => zp
                .parse()
                .map_err(|e| BackendError::Load(format!("bad {prefix}_zero_point '{zp}': {e}")))?,
            None => 0,
        };
        let q = Quantization::new(scale, zero_point);
        if !q.is_valid() {
            return Err(BackendError::Load(format!(
                "{prefix}_scale must be positive, got {scale}"
            )));
        }
        spec = spec.with_quantization(q);
    }
    Ok(spec)
}

/// Writes dense models in the layout [`DenseModel`] reads.
///
/// Used to author small models and test fixtures.
#[derive(Debug, Default, Clone)]
pub struct DenseModelWriter {
    layers: Vec<(Vec<f32>, usize, usize, Option<Vec<f32>>)>,
    metadata: HashMap<String, String>,
}

impl DenseModelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer with a row-major `[in_features, out_features]` weight.
    pub fn layer(
        mut self,
        weight: Vec<f32>,
        in_features: usize,
        out_features: usize,
        bias: Option<Vec<f32>>,
    ) -> Self {
        self.layers.push((weight, in_features, out_features, bias));
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn write(&self, path: &Path) -> Result<(), BackendError> {
        let to_bytes = |v: &[f32]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();

        let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
        for (i, (weight, in_f, out_f, bias)) in self.layers.iter().enumerate() {
            if weight.len() != in_f * out_f {
                return Err(BackendError::Load(format!(
                    "layer {i}: weight has {} values, expected {}",
                    weight.len(),
                    in_f * out_f
                )));
            }
            buffers.push((format!("layers.{i}.weight"), vec![*in_f, *out_f], to_bytes(weight)));
            if let Some(bias) = bias {
                buffers.push((format!("layers.{i}.bias"), vec![bias.len()], to_bytes(bias)));
            }
        }

        let mut views = Vec::with_capacity(buffers.len());
        for (name, shape, bytes) in &buffers {
            let view = safetensors::tensor::TensorView::new(
                safetensors::Dtype::F32,
                shape.clone(),
                bytes,
            )
            .map_err(|e| BackendError::Load(format!("'{name}': {e}")))?;
            views.push((name.clone(), view));
        }

        let metadata = Some(self.metadata.clone());
        safetensors::serialize_to_file(views, &metadata, path)
            .map_err(|e| BackendError::Load(format!("cannot write '{}': {e}", path.display())))
    }
}
