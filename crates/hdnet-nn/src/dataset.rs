use std::{collections::BTreeMap, path::Path};

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

const SUNRGBD_CLASSES: [&str; 10] = [
    "bed",
    "table",
    "sofa",
    "chair",
    "toilet",
    "desk",
    "dresser",
    "night_stand",
    "bookshelf",
    "bathtub",
];

const SUNRGBD_MEAN_SIZES: [[f32; 3]; 10] = [
    [2.114256, 1.620300, 0.927272],
    [0.791118, 1.279516, 0.718182],
    [0.923508, 1.867419, 0.845495],
    [0.591958, 0.552978, 0.827272],
    [0.699104, 0.454178, 0.756250],
    [0.695190, 1.346299, 0.736364],
    [0.528526, 1.002642, 1.172878],
    [0.500618, 0.632163, 0.683424],
    [0.404671, 1.071108, 1.688889],
    [0.765840, 1.398258, 0.472728],
];

const SCANNET_CLASSES: [&str; 18] = [
    "cabinet",
    "bed",
    "chair",
    "sofa",
    "table",
    "door",
    "window",
    "bookshelf",
    "picture",
    "counter",
    "desk",
    "curtain",
    "refrigerator",
    "showercurtrain",
    "toilet",
    "sink",
    "bathtub",
    "garbagebin",
];

const SCANNET_MEAN_SIZES: [[f32; 3]; 18] = [
    [0.76966727, 0.8116021, 0.92573744],
    [1.876858, 1.8425595, 1.1931566],
    [0.61328, 0.6148609, 0.7182701],
    [1.3955007, 1.5121545, 0.83443564],
    [0.97949594, 1.0675149, 0.6329687],
    [0.531663, 0.5955577, 1.7500148],
    [0.9624706, 0.72462326, 1.1481868],
    [0.83221924, 1.0490936, 1.6875663],
    [0.21132214, 0.4206159, 0.5372846],
    [1.4440073, 1.8970833, 0.26985747],
    [1.0294262, 1.4040797, 0.87554324],
    [1.3766412, 0.65521795, 1.6813129],
    [0.6650819, 0.71111923, 1.298853],
    [0.41999173, 0.37906948, 1.7513971],
    [0.59359556, 0.5912492, 0.73919016],
    [0.50867593, 0.50656086, 0.30136237],
    [1.1511526, 1.0546296, 0.49706793],
    [0.47535285, 0.49249494, 0.5802117],
];

/// Static description of a detection dataset, read by the network heads and the loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Short dataset name.
    pub name: String,
    /// Number of semantic classes.
    pub num_class: usize,
    /// Number of heading angle bins.
    pub num_heading_bin: usize,
    /// Number of box size clusters.
    pub num_size_cluster: usize,
    /// Mean box size (dx, dy, dz) of every size cluster.
    pub mean_size_arr: Vec<[f32; 3]>,
    /// Class name to class index.
    pub type2class: BTreeMap<String, usize>,
}

impl DatasetConfig {
    /// Configuration of the SUN RGB-D benchmark (10 classes, 12 heading bins).
    pub fn sunrgbd() -> Self {
        Self::from_tables("sunrgbd", &SUNRGBD_CLASSES, &SUNRGBD_MEAN_SIZES, 12)
    }

    /// Configuration of the ScanNet benchmark (18 classes, axis aligned boxes).
    pub fn scannet() -> Self {
        Self::from_tables("scannet", &SCANNET_CLASSES, &SCANNET_MEAN_SIZES, 1)
    }

    /// Look up a built-in configuration by name.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::UnsupportedDataset`] for names other than `sunrgbd` and `scannet`.
    pub fn from_name(name: &str) -> Result<Self, DatasetError> {
        match name {
            "sunrgbd" => Ok(Self::sunrgbd()),
            "scannet" => Ok(Self::scannet()),
            _ => Err(DatasetError::UnsupportedDataset(name.to_string())),
        }
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a JSON file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Check that the mean size table matches the number of size clusters.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.mean_size_arr.len() != self.num_size_cluster {
            return Err(DatasetError::InvalidMeanSizes {
                expected: self.num_size_cluster,
                actual: self.mean_size_arr.len(),
            });
        }
        Ok(())
    }

    /// Class name of a class index.
    pub fn class2type(&self, class: usize) -> Option<&str> {
        self.type2class
            .iter()
            .find(|(_, &c)| c == class)
            .map(|(name, _)| name.as_str())
    }

    /// The mean size table as a `(num_size_cluster, 3)` tensor.
    pub fn mean_size_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let flat = self.mean_size_arr.iter().flatten().copied().collect::<Vec<_>>();
        Tensor::from_vec(flat, (self.mean_size_arr.len(), 3), device)
    }

    fn from_tables(
        name: &str,
        classes: &[&str],
        mean_sizes: &[[f32; 3]],
        num_heading_bin: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            num_class: classes.len(),
            num_heading_bin,
            num_size_cluster: mean_sizes.len(),
            mean_size_arr: mean_sizes.to_vec(),
            type2class: classes
                .iter()
                .enumerate()
                .map(|(i, c)| (c.to_string(), i))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_configs() -> Result<(), DatasetError> {
        let sunrgbd = DatasetConfig::from_name("sunrgbd")?;
        assert_eq!(sunrgbd.num_class, 10);
        assert_eq!(sunrgbd.num_heading_bin, 12);
        assert_eq!(sunrgbd.num_size_cluster, 10);
        assert_eq!(sunrgbd.type2class["night_stand"], 7);
        assert_eq!(sunrgbd.class2type(9), Some("bathtub"));
        sunrgbd.validate()?;

        let scannet = DatasetConfig::from_name("scannet")?;
        assert_eq!(scannet.num_class, 18);
        assert_eq!(scannet.num_heading_bin, 1);
        assert_eq!(scannet.mean_size_arr.len(), 18);

        assert!(matches!(
            DatasetConfig::from_name("kitti"),
            Err(DatasetError::UnsupportedDataset(name)) if name == "kitti"
        ));

        Ok(())
    }

    #[test]
    fn test_json_file_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sunrgbd.json");

        let config = DatasetConfig::sunrgbd();
        config.to_json_file(&path)?;
        let loaded = DatasetConfig::from_json_file(&path)?;
        assert_eq!(config, loaded);

        let mut broken = config.clone();
        broken.mean_size_arr.pop();
        broken.to_json_file(&path)?;
        assert!(matches!(
            DatasetConfig::from_json_file(&path),
            Err(DatasetError::InvalidMeanSizes {
                expected: 10,
                actual: 9
            })
        ));

        Ok(())
    }

    #[test]
    fn test_mean_size_tensor() -> candle_core::Result<()> {
        let config = DatasetConfig::sunrgbd();
        let t = config.mean_size_tensor(&Device::Cpu)?;
        assert_eq!(t.dims(), &[10, 3]);
        let rows = t.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![2.114256, 1.620300, 0.927272]);
        Ok(())
    }
}
