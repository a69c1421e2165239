//! Parameter exchange between the trainer and both deployment targets.
//!
//! One [`ModelArtifact`] holds the scaler statistics and network parameters.
//! It can be rendered as:
//!
//! - a flat `f32` list in the order `x_mean, x_std, y_mean, y_std, W1, B1,
//!   W2, B2, W3, B3` (matrices row-major), optionally as little-endian bytes;
//! - a JSON document loaded at runtime by the adaptive gateway;
//! - Rust source with fixed-size `static` arrays, compiled into the
//!   memory-frozen embedded build.
//!
//! Every rendering prints or stores the exact `f32` bits, so a predictor
//! rebuilt from any of them produces identical outputs.

use std::fmt::Write as _;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{Topology, N_FEATURES, N_OUTPUTS};
use crate::error::{ForecastError, Result};
use crate::network::NetworkParams;
use crate::scaler::Standardizer;

/// Scaler statistics and network parameters as plain nested vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub x_mean: Vec<f32>,
    pub x_std: Vec<f32>,
    pub y_mean: Vec<f32>,
    pub y_std: Vec<f32>,
    pub w1: Vec<Vec<f32>>,
    pub b1: Vec<f32>,
    pub w2: Vec<Vec<f32>>,
    pub b2: Vec<f32>,
    pub w3: Vec<Vec<f32>>,
    pub b3: Vec<f32>,
}

impl ModelArtifact {
    pub fn from_parts(
        params: &NetworkParams,
        input_scaler: &Standardizer,
        target_scaler: &Standardizer,
    ) -> Self {
        Self {
            x_mean: input_scaler.mean().to_vec(),
            x_std: input_scaler.std().to_vec(),
            y_mean: target_scaler.mean().to_vec(),
            y_std: target_scaler.std().to_vec(),
            w1: rows(&params.w1),
            b1: params.b1.to_vec(),
            w2: rows(&params.w2),
            b2: params.b2.to_vec(),
            w3: rows(&params.w3),
            b3: params.b3.to_vec(),
        }
    }

    /// Topology implied by the array lengths.
    ///
    /// # Errors
    /// `Configuration` if the input width is not a whole number of windows.
    pub fn topology(&self) -> Result<Topology> {
        let n_in = self.w1.len();
        if n_in == 0 || n_in % N_FEATURES != 0 {
            return Err(ForecastError::configuration(format!(
                "W1: {n_in} rows is not a multiple of {N_FEATURES} features"
            )));
        }
        let hidden1 = self.b1.len();
        let hidden2 = self.b2.len();
        Ok(Topology::new(n_in / N_FEATURES, hidden1, hidden2))
    }

    /// Convert into network parameters and both scalers, validating every shape.
    pub fn to_parts(&self) -> Result<(NetworkParams, Standardizer, Standardizer)> {
        let topology = self.topology()?;
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);

        ForecastError::check_len("x_mean", n_in, self.x_mean.len())?;
        ForecastError::check_len("y_mean", N_OUTPUTS, self.y_mean.len())?;
        let input_scaler = Standardizer::from_parts(self.x_mean.clone(), self.x_std.clone())?;
        let target_scaler = Standardizer::from_parts(self.y_mean.clone(), self.y_std.clone())?;

        let params = NetworkParams::new(
            topology,
            matrix("W1", &self.w1, (n_in, h1))?,
            Array1::from(self.b1.clone()),
            matrix("W2", &self.w2, (h1, h2))?,
            Array1::from(self.b2.clone()),
            matrix("W3", &self.w3, (h2, N_OUTPUTS))?,
            Array1::from(self.b3.clone()),
        )?;
        Ok((params, input_scaler, target_scaler))
    }

    /// Flatten in artifact order.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut flat = Vec::new();
        flat.extend_from_slice(&self.x_mean);
        flat.extend_from_slice(&self.x_std);
        flat.extend_from_slice(&self.y_mean);
        flat.extend_from_slice(&self.y_std);
        for (weights, biases) in [(&self.w1, &self.b1), (&self.w2, &self.b2), (&self.w3, &self.b3)] {
            for row in weights {
                flat.extend_from_slice(row);
            }
            flat.extend_from_slice(biases);
        }
        flat
    }

    /// Split a flat list back into arrays.
    ///
    /// # Errors
    /// `Configuration` if `values.len()` differs from `topology.artifact_len()`.
    pub fn from_flat(topology: Topology, values: &[f32]) -> Result<Self> {
        topology.validate()?;
        ForecastError::check_len("flat artifact", topology.artifact_len(), values.len())?;
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);

        let mut rest = values;
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head.to_vec()
        };

        let x_mean = take(n_in);
        let x_std = take(n_in);
        let y_mean = take(N_OUTPUTS);
        let y_std = take(N_OUTPUTS);
        let w1 = take(n_in * h1).chunks(h1).map(<[f32]>::to_vec).collect();
        let b1 = take(h1);
        let w2 = take(h1 * h2).chunks(h2).map(<[f32]>::to_vec).collect();
        let b2 = take(h2);
        let w3 = take(h2 * N_OUTPUTS)
            .chunks(N_OUTPUTS)
            .map(<[f32]>::to_vec)
            .collect();
        let b3 = take(N_OUTPUTS);

        Ok(Self {
            x_mean,
            x_std,
            y_mean,
            y_std,
            w1,
            b1,
            w2,
            b2,
            w3,
            b3,
        })
    }

    /// Flat list as little-endian IEEE-754 bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.to_flat()
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect()
    }

    pub fn from_le_bytes(topology: Topology, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(ForecastError::Serialization(format!(
                "byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::from_flat(topology, &values)
    }

    /// Runtime document for the gateway.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a runtime document and validate its shapes.
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.to_parts()?;
        Ok(artifact)
    }

    /// Rust source declaring the model as fixed-size arrays.
    ///
    /// Arrays appear in artifact order and values use the shortest `f32`
    /// literal that parses back to the same bits.
    pub fn to_rust_source(&self) -> Result<String> {
        let topology = self.topology()?;
        self.to_parts()?;
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);

        let mut out = String::new();
        out.push_str("// Generated model parameters. Do not edit.\n\n");
        let _ = writeln!(out, "pub const WINDOW_SIZE: usize = {};", topology.window_size);
        let _ = writeln!(out, "pub const N_INPUTS: usize = {n_in};");
        let _ = writeln!(out, "pub const HIDDEN1: usize = {h1};");
        let _ = writeln!(out, "pub const HIDDEN2: usize = {h2};");
        let _ = writeln!(out, "pub const N_OUTPUTS: usize = {N_OUTPUTS};");
        out.push('\n');

        write_vector(&mut out, "X_MEAN", "N_INPUTS", &self.x_mean);
        write_vector(&mut out, "X_STD", "N_INPUTS", &self.x_std);
        write_vector(&mut out, "Y_MEAN", "N_OUTPUTS", &self.y_mean);
        write_vector(&mut out, "Y_STD", "N_OUTPUTS", &self.y_std);
        write_matrix(&mut out, "W1", ("N_INPUTS", "HIDDEN1"), &self.w1);
        write_vector(&mut out, "B1", "HIDDEN1", &self.b1);
        write_matrix(&mut out, "W2", ("HIDDEN1", "HIDDEN2"), &self.w2);
        write_vector(&mut out, "B2", "HIDDEN2", &self.b2);
        write_matrix(&mut out, "W3", ("HIDDEN2", "N_OUTPUTS"), &self.w3);
        write_vector(&mut out, "B3", "N_OUTPUTS", &self.b3);
        Ok(out)
    }

    pub fn parameter_count(&self) -> usize {
        let weights: usize = [&self.w1, &self.w2, &self.w3]
            .iter()
            .flat_map(|m| m.iter())
            .map(Vec::len)
            .sum();
        weights + self.b1.len() + self.b2.len() + self.b3.len()
    }
}

fn rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn matrix(name: &str, rows: &[Vec<f32>], shape: (usize, usize)) -> Result<Array2<f32>> {
    ForecastError::check_len(name, shape.0, rows.len())?;
    let mut flat = Vec::with_capacity(shape.0 * shape.1);
    for (i, row) in rows.iter().enumerate() {
        ForecastError::check_len(&format!("{name} row {i}"), shape.1, row.len())?;
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec(shape, flat).map_err(|e| ForecastError::configuration(format!("{name}: {e}")))
}

fn literal(value: f32) -> String {
    // `Debug` prints the shortest round-trip form and always keeps a decimal
    // point or exponent, so the token stays an `f32` literal.
    format!("{value:?}")
}

fn write_vector(out: &mut String, name: &str, len: &str, values: &[f32]) {
    let body: Vec<String> = values.iter().map(|&v| literal(v)).collect();
    let _ = writeln!(out, "pub static {name}: [f32; {len}] = [{}];", body.join(", "));
}

fn write_matrix(out: &mut String, name: &str, shape: (&str, &str), rows: &[Vec<f32>]) {
    let _ = writeln!(out, "pub static {name}: [[f32; {}]; {}] = [", shape.1, shape.0);
    for row in rows {
        let body: Vec<String> = row.iter().map(|&v| literal(v)).collect();
        let _ = writeln!(out, "    [{}],", body.join(", "));
    }
    out.push_str("];\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_artifact(topology: Topology) -> ModelArtifact {
        let params = NetworkParams::glorot_uniform(topology, &mut StdRng::seed_from_u64(1));
        let n_in = topology.n_inputs();
        let x_mean: Vec<f32> = (0..n_in).map(|i| 20.0 + i as f32 * 0.37).collect();
        let x_std: Vec<f32> = (0..n_in).map(|i| 1.5 + i as f32 * 0.013).collect();
        let input_scaler = Standardizer::from_parts(x_mean, x_std).unwrap();
        let target_scaler = Standardizer::from_parts(vec![21.25, 47.8], vec![3.1, 9.7]).unwrap();
        ModelArtifact::from_parts(&params, &input_scaler, &target_scaler)
    }

    #[test]
    fn test_flat_layout() {
        let topology = Topology::new(4, 3, 2);
        let artifact = sample_artifact(topology);
        let flat = artifact.to_flat();

        assert_eq!(flat.len(), topology.artifact_len());
        assert_eq!(flat[0], artifact.x_mean[0]);
        assert_eq!(flat[12], artifact.x_std[0]);
        assert_eq!(flat[24], artifact.y_mean[0]);
        assert_eq!(flat[26], artifact.y_std[0]);
        assert_eq!(flat[28], artifact.w1[0][0]);
        assert_eq!(flat[29], artifact.w1[0][1]);
        assert_eq!(flat[31], artifact.w1[1][0]);
        assert_eq!(*flat.last().unwrap(), artifact.b3[1]);
    }

    #[test]
    fn test_flat_reconstruct() {
        let topology = Topology::default();
        let artifact = sample_artifact(topology);
        let back = ModelArtifact::from_flat(topology, &artifact.to_flat()).unwrap();
        assert_eq!(artifact, back);
    }

    #[test]
    fn test_flat_length_mismatch() {
        let topology = Topology::default();
        let mut flat = sample_artifact(topology).to_flat();
        flat.pop();
        let err = ModelArtifact::from_flat(topology, &flat).unwrap_err();
        assert_eq!(
            err,
            ForecastError::configuration("flat artifact: expected 3006 values, got 3005")
        );
    }

    #[test]
    fn test_le_bytes_reconstruct() {
        let topology = Topology::new(4, 8, 4);
        let artifact = sample_artifact(topology);
        let bytes = artifact.to_le_bytes();
        assert_eq!(bytes.len(), topology.artifact_len() * 4);
        assert_eq!(ModelArtifact::from_le_bytes(topology, &bytes).unwrap(), artifact);
        assert!(matches!(
            ModelArtifact::from_le_bytes(topology, &bytes[1..]),
            Err(ForecastError::Serialization(_))
        ));
    }

    #[test]
    fn test_json_reconstruct() {
        let artifact = sample_artifact(Topology::new(4, 8, 4));
        let json = artifact.to_json().unwrap();
        assert_eq!(ModelArtifact::from_json(&json).unwrap(), artifact);
    }

    #[test]
    fn test_json_rejects_bad_shape() {
        let mut artifact = sample_artifact(Topology::new(4, 8, 4));
        artifact.w2[3].pop();
        let json = serde_json::to_string(&artifact).unwrap();
        assert_eq!(
            ModelArtifact::from_json(&json).unwrap_err(),
            ForecastError::configuration("W2 row 3: expected 4 values, got 3")
        );
    }

    #[test]
    fn test_rust_source_literals_round_trip() {
        let artifact = sample_artifact(Topology::new(4, 8, 4));
        let source = artifact.to_rust_source().unwrap();

        assert!(source.contains("pub const N_INPUTS: usize = 12;"));
        assert!(source.contains("pub static W1: [[f32; HIDDEN1]; N_INPUTS] = ["));
        assert!(source.contains("pub static B3: [f32; N_OUTPUTS] = ["));

        // Collect every literal inside the array bodies, in order.
        let mut values = Vec::new();
        let array_lines = source
            .lines()
            .filter(|l| l.starts_with("pub static") || l.trim_start().starts_with('['));
        for line in array_lines {
            let body = match line.rfind('=') {
                Some(eq) => &line[eq + 1..],
                None => line,
            };
            for token in body.split(|c: char| c == ',' || c == '[' || c == ']' || c == ';') {
                let token = token.trim();
                if !token.is_empty() {
                    values.push(token.parse::<f32>().unwrap());
                }
            }
        }
        let flat = artifact.to_flat();
        assert_eq!(values.len(), flat.len());
        for (a, b) in values.iter().zip(flat.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_parameter_count() {
        let topology = Topology::default();
        assert_eq!(
            sample_artifact(topology).parameter_count(),
            topology.parameter_count()
        );
    }
}
