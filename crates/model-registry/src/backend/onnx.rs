// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! General-purpose ONNX backend built on `tract-onnx`. CPU only.

use std::path::Path;

use tensor_core::{DType, Shape, Tensor, TensorData, TensorSpec};
use tract_onnx::prelude as tract;
use tract_onnx::prelude::{Framework, InferenceModelExt};
use tract_onnx::tract_hir::internal::DimLike;

use super::{BackendProvider, ModelHandle, ModelSignature};
use crate::{BackendError, BackendKind, Device};

type Plan = tract::SimplePlan<tract::TypedFact, Box<dyn tract::TypedOp>, tract::TypedModel>;

/// Provider for `.onnx` artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxProvider;

impl BackendProvider for OnnxProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Onnx
    }

    fn load(&self, path: &Path, device: Device) -> Result<Box<dyn ModelHandle>, BackendError> {
        if device != Device::Cpu {
            return Err(BackendError::DeviceUnsupported {
                backend: BackendKind::Onnx,
                device,
            });
        }
        let load_err = |e: tract::TractError| BackendError::Load(format!("{e:#}"));

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?;

        let mut inputs = Vec::new();
        for outlet in model.input_outlets().map_err(load_err)? {
            inputs.push(spec_for(&model, *outlet)?);
        }
        let mut outputs = Vec::new();
        for outlet in model.output_outlets().map_err(load_err)? {
            outputs.push(spec_for(&model, *outlet)?);
        }

        let plan = model.into_runnable().map_err(load_err)?;
        tracing::debug!(
            "onnx: loaded {} ({} inputs, {} outputs)",
            path.display(),
            inputs.len(),
            outputs.len(),
        );

        Ok(Box::new(OnnxModel {
            plan,
            signature: ModelSignature { inputs, outputs },
        }))
    }
}

struct OnnxModel {
    plan: Plan,
    signature: ModelSignature,
}

impl ModelHandle for OnnxModel {
    fn describe(&self) -> &ModelSignature {
        &self.signature
    }

    fn infer(&self, input: &Tensor) -> Result<Vec<Tensor>, BackendError> {
        let run_err = |e: tract::TractError| BackendError::Inference(format!("{e:#}"));

        let dims = input.shape().dims();
        let value = match input.data() {
            TensorData::F32(v) => tract::Tensor::from_shape(dims, v),
            TensorData::F64(v) => tract::Tensor::from_shape(dims, v),
            TensorData::I8(v) => tract::Tensor::from_shape(dims, v),
            TensorData::U8(v) => tract::Tensor::from_shape(dims, v),
            TensorData::I32(v) => tract::Tensor::from_shape(dims, v),
            TensorData::I64(v) => tract::Tensor::from_shape(dims, v),
        }
        .map_err(run_err)?;

        let outputs = self
            .plan
            .run(std::iter::once(value.into()).collect())
            .map_err(run_err)?;

        outputs.iter().map(|t| from_tract(t)).collect()
    }
}

fn spec_for(model: &tract::TypedModel, outlet: tract::OutletId) -> Result<TensorSpec, BackendError> {
    let fact = model
        .outlet_fact(outlet)
        .map_err(|e| BackendError::Load(format!("{e:#}")))?;
    let name = model.node(outlet.node).name.clone();
    let shape = fact.shape.iter().map(|d| d.to_usize().ok()).collect();
    let dtype = dtype_from_datum(fact.datum_type).ok_or_else(|| {
        BackendError::Load(format!("'{name}' has unsupported element type {:?}", fact.datum_type))
    })?;
    Ok(TensorSpec::new(name, shape, dtype))
}

fn dtype_from_datum(datum: tract::DatumType) -> Option<DType> {
    match datum {
        tract::DatumType::F32 => Some(DType::F32),
        tract::DatumType::F64 => Some(DType::F64),
        tract::DatumType::I8 => Some(DType::I8),
        tract::DatumType::U8 => Some(DType::U8),
        tract::DatumType::I32 => Some(DType::I32),
        tract::DatumType::I64 => Some(DType::I64),
        _ => None,
    }
}

fn from_tract(value: &tract::Tensor) -> Result<Tensor, BackendError> {
    let err = |e: tract::TractError| BackendError::Inference(format!("{e:#}"));
    let shape = Shape::new(value.shape().to_vec());
    let data = match value.datum_type() {
        tract::DatumType::F64 => TensorData::F64(value.as_slice::<f64>().map_err(err)?.to_vec()),
        tract::DatumType::I8 => TensorData::I8(value.as_slice::<i8>().map_err(err)?.to_vec()),
        tract::DatumType::U8 => TensorData::U8(value.as_slice::<u8>().map_err(err)?.to_vec()),
        tract::DatumType::I32 => TensorData::I32(value.as_slice::<i32>().map_err(err)?.to_vec()),
        tract::DatumType::I64 => TensorData::I64(value.as_slice::<i64>().map_err(err)?.to_vec()),
        _ => {
            let cast = value.cast_to::<f32>().map_err(err)?;
            TensorData::F32(cast.as_slice::<f32>().map_err(err)?.to_vec())
        }
    };
    Ok(Tensor::new(shape, data)?)
}
