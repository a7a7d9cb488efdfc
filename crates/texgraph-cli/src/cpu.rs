//! CPU procedural texture backend.
//!
//! Renders single-channel `f32` textures in `[0, 1]`. Every program is a pure
//! function of its effective inputs, so re-rendering an unchanged node yields
//! a bit-identical texture (and digest).

use std::future::Future;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use texgraph_core::{EffectiveInputs, ParamValue};
use texgraph_engine::{RenderBackend, RenderError, RenderRequest};

/// A square grayscale texture, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl Texture {
    fn from_fn(size: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                pixels.push(f(x, y).clamp(0.0, 1.0));
            }
        }
        Texture {
            width: size,
            height: size,
            pixels,
        }
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Texture {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&p| f(p).clamp(0.0, 1.0)).collect(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> f32 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().sum::<f32>() / self.pixels.len() as f32
    }

    /// Content hash over dimensions and pixel bits.
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.width.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        for pixel in &self.pixels {
            hasher.update(&pixel.to_le_bytes());
        }
        hasher.finalize()
    }
}

/// Renders every built-in program on the CPU at a fixed texture size.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    size: u32,
}

impl CpuBackend {
    pub fn new(size: u32) -> Self {
        CpuBackend { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl RenderBackend for CpuBackend {
    type Artifact = Texture;
    type Target = ();

    fn render(
        &self,
        request: RenderRequest<Texture, ()>,
    ) -> impl Future<Output = Result<Texture, RenderError>> + Send {
        let size = self.size;
        async move {
            tracing::debug!(node = %request.node, program = request.program(), "rendering");
            tokio::task::spawn_blocking(move || run_program(request.program(), &request.inputs, size))
                .await
                .map_err(|err| RenderError::Failed(format!("render task panicked: {}", err)))?
        }
    }
}

fn run_program(program: &str, inputs: &EffectiveInputs<Texture>, size: u32) -> Result<Texture, RenderError> {
    match program {
        "constant" => {
            let value = number(inputs, "value")? as f32;
            Ok(Texture::from_fn(size, |_, _| value))
        }
        "gradient" => {
            let vertical = match text(inputs, "direction")? {
                "horizontal" => false,
                "vertical" => true,
                other => {
                    return Err(RenderError::InvalidParameter {
                        slot: "direction".into(),
                        reason: format!("expected 'horizontal' or 'vertical', got '{}'", other),
                    })
                }
            };
            let span = size.saturating_sub(1).max(1) as f32;
            Ok(Texture::from_fn(size, |x, y| {
                if vertical {
                    y as f32 / span
                } else {
                    x as f32 / span
                }
            }))
        }
        "checker" => {
            let cells = number(inputs, "cells")?;
            if cells < 1.0 {
                return Err(RenderError::InvalidParameter {
                    slot: "cells".into(),
                    reason: "must be at least 1".into(),
                });
            }
            let cell = (size as f64 / cells).max(1.0);
            Ok(Texture::from_fn(size, |x, y| {
                let cx = (x as f64 / cell) as u64;
                let cy = (y as f64 / cell) as u64;
                ((cx + cy) % 2) as f32
            }))
        }
        "noise" => {
            let seed = number(inputs, "seed")?;
            if seed < 0.0 || seed.fract() != 0.0 {
                return Err(RenderError::InvalidParameter {
                    slot: "seed".into(),
                    reason: "must be a non-negative integer".into(),
                });
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
            let pixels = (0..size * size).map(|_| rng.gen::<f32>()).collect();
            Ok(Texture {
                width: size,
                height: size,
                pixels,
            })
        }
        "blend" => {
            let a = texture(inputs, "a")?;
            let b = texture(inputs, "b")?;
            if a.width != b.width || a.height != b.height {
                return Err(RenderError::Failed(format!(
                    "blend inputs differ in size: {}x{} vs {}x{}",
                    a.width, a.height, b.width, b.height
                )));
            }
            let mix = number(inputs, "mix")? as f32;
            let op: fn(f32, f32, f32) -> f32 = match text(inputs, "mode")? {
                "mix" => |a, b, t| a + (b - a) * t,
                "multiply" => |a, b, t| a + (a * b - a) * t,
                "add" => |a, b, t| a + b * t,
                other => {
                    return Err(RenderError::InvalidParameter {
                        slot: "mode".into(),
                        reason: format!("unknown blend mode '{}'", other),
                    })
                }
            };
            let pixels = a
                .pixels
                .iter()
                .zip(&b.pixels)
                .map(|(&pa, &pb)| op(pa, pb, mix).clamp(0.0, 1.0))
                .collect();
            Ok(Texture {
                width: a.width,
                height: a.height,
                pixels,
            })
        }
        "invert" => Ok(texture(inputs, "in")?.map(|p| 1.0 - p)),
        "levels" => {
            let src = texture(inputs, "in")?;
            let low = number(inputs, "low")? as f32;
            let high = number(inputs, "high")? as f32;
            let gamma = number(inputs, "gamma")? as f32;
            if high <= low {
                return Err(RenderError::InvalidParameter {
                    slot: "high".into(),
                    reason: format!("must exceed low ({})", low),
                });
            }
            if gamma <= 0.0 {
                return Err(RenderError::InvalidParameter {
                    slot: "gamma".into(),
                    reason: "must be positive".into(),
                });
            }
            Ok(src.map(|p| ((p - low) / (high - low)).clamp(0.0, 1.0).powf(1.0 / gamma)))
        }
        other => Err(RenderError::UnsupportedProgram {
            program: other.to_string(),
        }),
    }
}

fn texture<'a>(inputs: &'a EffectiveInputs<Texture>, slot: &str) -> Result<&'a Arc<Texture>, RenderError> {
    inputs
        .artifact(slot)
        .ok_or_else(|| RenderError::MissingInput { slot: slot.into() })
}

fn number(inputs: &EffectiveInputs<Texture>, slot: &str) -> Result<f64, RenderError> {
    match inputs.literal(slot) {
        Some(ParamValue::Number(n)) => Ok(*n),
        Some(_) => Err(RenderError::InvalidParameter {
            slot: slot.into(),
            reason: "expected a number".into(),
        }),
        None => Err(RenderError::MissingInput { slot: slot.into() }),
    }
}

fn text<'a>(inputs: &'a EffectiveInputs<Texture>, slot: &str) -> Result<&'a str, RenderError> {
    inputs
        .literal(slot)
        .and_then(ParamValue::as_str)
        .ok_or_else(|| RenderError::MissingInput { slot: slot.into() })
}
