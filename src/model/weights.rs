use std::{collections::HashMap, fs, path::Path};

use ndarray::{ArrayD, IxDyn};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use serde::{de::DeserializeOwned, Serialize};

use crate::{CleanerError, Result};

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const CONFIG_FILE: &str = "config.json";

/// Writes `config.json` and `model.safetensors` into `dir`, creating it if needed.
///
/// # Arguments
/// * `dir` - The directory the model is saved into.
/// * `config` - The model's architecture parameters.
/// * `tensors` - Named f32 tensors.
pub fn save<C: Serialize>(dir: &Path, config: &C, tensors: &[(&str, ArrayD<f32>)]) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(config)?)?;

    let owned: Vec<_> = tensors
        .iter()
        .map(|(name, array)| {
            let data = array.as_standard_layout().iter().copied().collect::<Vec<f32>>();
            (*name, array.shape().to_vec(), data)
        })
        .collect();

    let views = owned
        .iter()
        .map(|(name, shape, data)| {
            let bytes: &[u8] = bytemuck::cast_slice(data);
            TensorView::new(Dtype::F32, shape.clone(), bytes).map(|view| (*name, view))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let buffer = safetensors::serialize(views, &None)?;
    fs::write(dir.join(WEIGHTS_FILE), buffer)?;
    Ok(())
}

/// Reads a model written by [`save`], returning its config and tensors by name.
///
/// # Errors
/// `ModelNotFound` if `dir` has no weights file; `Serialization` on any
/// non-f32 tensor or unreadable file.
pub fn load<C: DeserializeOwned>(dir: &Path) -> Result<(C, HashMap<String, ArrayD<f32>>)> {
    let weights_path = dir.join(WEIGHTS_FILE);
    if !weights_path.is_file() {
        return Err(CleanerError::ModelNotFound(dir.to_path_buf()));
    }

    let config = serde_json::from_str(&fs::read_to_string(dir.join(CONFIG_FILE))?)?;
    let buffer = fs::read(weights_path)?;
    let safetensors = SafeTensors::deserialize(&buffer)?;

    let mut tensors = HashMap::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(CleanerError::Serialization(format!(
                "tensor {name} has dtype {:?}, expected F32",
                view.dtype()
            )));
        }

        let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        let array = ArrayD::from_shape_vec(IxDyn(view.shape()), data)?;
        tensors.insert(name, array);
    }

    Ok((config, tensors))
}

/// Removes the tensor `name` from `tensors` as a fixed-rank array.
pub fn take<D: ndarray::Dimension>(
    tensors: &mut HashMap<String, ArrayD<f32>>,
    name: &str,
) -> Result<ndarray::Array<f32, D>> {
    let tensor = tensors
        .remove(name)
        .ok_or_else(|| CleanerError::Serialization(format!("missing tensor {name}")))?;

    tensor
        .into_dimensionality::<D>()
        .map_err(|e| CleanerError::Serialization(format!("tensor {name}: {e}")))
}
