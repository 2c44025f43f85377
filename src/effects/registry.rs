use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::effects::effect::{CustomEffect, Effect, EffectKind};
use crate::foundation::error::{FramecutError, FramecutResult};

/// Declarative effect descriptor as stored in a project file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Effects of one clip apply in ascending index order.
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// First frame of a continuous effect's interpolation window.
    #[serde(default)]
    pub start_point: u64,
    /// End of a continuous effect's interpolation window. Both zero means "the clip's range".
    #[serde(default)]
    pub end_point: u64,
    /// Canvas width the coordinates were authored against; 0 means the render target.
    #[serde(default)]
    pub relative_width: u32,
    #[serde(default)]
    pub relative_height: u32,
}

fn default_enabled() -> bool {
    true
}

impl EffectSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: String::new(),
            enabled: true,
            index: 0,
            params: BTreeMap::new(),
            start_point: 0,
            end_point: 0,
            relative_width: 0,
            relative_height: 0,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }

    pub fn with_window(mut self, start: u64, end: u64) -> Self {
        self.start_point = start;
        self.end_point = end;
        self
    }

    pub fn with_reference(mut self, width: u32, height: u32) -> Self {
        self.relative_width = width;
        self.relative_height = height;
        self
    }
}

/// Constructor for an externally provided effect type.
pub type EffectFactory =
    Arc<dyn Fn(&EffectSpec) -> FramecutResult<Arc<dyn CustomEffect>> + Send + Sync>;

/// Required and optional parameter names of each built-in effect type.
const BUILTINS: &[(&str, &[&str], &[&str])] = &[
    ("RemoveColor", &["R", "G", "B", "A", "Tolerance"], &[]),
    ("Place", &["StartX", "StartY"], &[]),
    ("Crop", &["StartX", "StartY", "Width", "Height"], &[]),
    ("Resize", &["Width", "Height"], &["PreserveAspectRatio"]),
    ("ColorCorrection", &["Brightness", "Contrast"], &[]),
    ("ReplaceAlpha", &["Alpha"], &[]),
    ("ZoomIn", &["TargetX", "TargetY"], &[]),
    ("Jitter", &["MaxOffsetX", "MaxOffsetY"], &["Seed"]),
];

/// Maps effect type names to constructors.
#[derive(Clone, Default)]
pub struct EffectRegistry {
    custom: BTreeMap<String, EffectFactory>,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an external effect type. Built-in names cannot be shadowed.
    pub fn register(&mut self, type_name: impl Into<String>, factory: EffectFactory) -> FramecutResult<()> {
        let type_name = type_name.into();
        if BUILTINS.iter().any(|(n, _, _)| *n == type_name) || self.custom.contains_key(&type_name) {
            return Err(FramecutError::validation(format!(
                "effect type '{type_name}' is already registered"
            )));
        }
        self.custom.insert(type_name, factory);
        Ok(())
    }

    /// All known effect type names, built-ins first.
    pub fn type_names(&self) -> Vec<String> {
        BUILTINS
            .iter()
            .map(|(n, _, _)| (*n).to_string())
            .chain(self.custom.keys().cloned())
            .collect()
    }

    /// Validate `spec` without keeping the instance.
    pub fn validate(&self, spec: &EffectSpec) -> FramecutResult<()> {
        self.build(spec).map(|_| ())
    }

    /// Build an effect instance from its descriptor.
    pub fn build(&self, spec: &EffectSpec) -> FramecutResult<Effect> {
        let kind = if let Some((_, required, optional)) =
            BUILTINS.iter().find(|(n, _, _)| *n == spec.type_name)
        {
            check_params(&spec.params, required, optional)?;
            builtin_kind(spec)?
        } else if let Some(factory) = self.custom.get(&spec.type_name) {
            EffectKind::Custom(factory(spec)?)
        } else {
            return Err(FramecutError::validation(format!(
                "unknown effect type '{}'",
                spec.type_name
            )));
        };

        let name = if spec.name.is_empty() {
            spec.type_name.clone()
        } else {
            spec.name.clone()
        };
        Ok(Effect::new(spec.type_name.clone(), kind)
            .with_name(name)
            .with_index(spec.index)
            .with_enabled(spec.enabled)
            .with_reference(spec.relative_width, spec.relative_height)
            .with_window(spec.start_point, spec.end_point))
    }
}

fn check_params(
    params: &BTreeMap<String, Value>,
    required: &[&str],
    optional: &[&str],
) -> FramecutResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| !params.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(FramecutError::validation(format!(
            "Missing parameters: {}",
            missing.join(", ")
        )));
    }
    if params
        .keys()
        .any(|k| !required.contains(&k.as_str()) && !optional.contains(&k.as_str()))
    {
        return Err(FramecutError::validation("Too many parameters provided."));
    }
    Ok(())
}

fn builtin_kind(spec: &EffectSpec) -> FramecutResult<EffectKind> {
    let p = Params {
        effect: &spec.type_name,
        params: &spec.params,
    };
    Ok(match spec.type_name.as_str() {
        "RemoveColor" => EffectKind::RemoveColor {
            r: p.u16("R")?,
            g: p.u16("G")?,
            b: p.u16("B")?,
            a: p.u16("A")?,
            tolerance: p.u16("Tolerance")?,
        },
        "Place" => EffectKind::Place {
            x: p.i32("StartX")?,
            y: p.i32("StartY")?,
        },
        "Crop" => EffectKind::Crop {
            x: p.u32("StartX")?,
            y: p.u32("StartY")?,
            width: p.positive("Width")?,
            height: p.positive("Height")?,
        },
        "Resize" => EffectKind::Resize {
            width: p.positive("Width")?,
            height: p.positive("Height")?,
            preserve_aspect: p.bool_or("PreserveAspectRatio", true)?,
        },
        "ColorCorrection" => EffectKind::ColorCorrection {
            brightness: p.f32("Brightness")?,
            contrast: p.f32("Contrast")?,
        },
        "ReplaceAlpha" => {
            let alpha = p.f32("Alpha")?;
            if !(0.0..=1.0).contains(&alpha) {
                return Err(p.invalid("Alpha", "a number within [0, 1]"));
            }
            EffectKind::ReplaceAlpha { alpha }
        }
        "ZoomIn" => EffectKind::ZoomIn {
            target_width: p.positive("TargetX")?,
            target_height: p.positive("TargetY")?,
        },
        "Jitter" => EffectKind::Jitter {
            max_offset_x: p.u32("MaxOffsetX")?,
            max_offset_y: p.u32("MaxOffsetY")?,
            seed: p.opt_u64("Seed")?.unwrap_or(0),
        },
        other => {
            return Err(FramecutError::validation(format!(
                "unknown effect type '{other}'"
            )));
        }
    })
}

struct Params<'a> {
    effect: &'a str,
    params: &'a BTreeMap<String, Value>,
}

impl Params<'_> {
    fn invalid(&self, key: &str, expected: &str) -> FramecutError {
        FramecutError::validation(format!(
            "parameter '{key}' of effect '{}' must be {expected}",
            self.effect
        ))
    }

    fn number(&self, key: &str) -> FramecutResult<f64> {
        let v = self
            .params
            .get(key)
            .ok_or_else(|| FramecutError::validation(format!("Missing parameters: {key}")))?;
        let n = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
            .ok_or_else(|| self.invalid(key, "a number"))
    }

    fn integer(&self, key: &str, min: f64, max: f64, expected: &str) -> FramecutResult<f64> {
        let n = self.number(key)?;
        if n.fract() != 0.0 || n < min || n > max {
            return Err(self.invalid(key, expected));
        }
        Ok(n)
    }

    fn u16(&self, key: &str) -> FramecutResult<u16> {
        self.integer(key, 0.0, f64::from(u16::MAX), "an integer within [0, 65535]")
            .map(|n| n as u16)
    }

    fn u32(&self, key: &str) -> FramecutResult<u32> {
        self.integer(key, 0.0, f64::from(u32::MAX), "a non-negative integer")
            .map(|n| n as u32)
    }

    fn positive(&self, key: &str) -> FramecutResult<u32> {
        self.integer(key, 1.0, f64::from(u32::MAX), "a positive integer")
            .map(|n| n as u32)
    }

    fn i32(&self, key: &str) -> FramecutResult<i32> {
        self.integer(key, f64::from(i32::MIN), f64::from(i32::MAX), "an integer")
            .map(|n| n as i32)
    }

    fn f32(&self, key: &str) -> FramecutResult<f32> {
        self.number(key).map(|n| n as f32)
    }

    fn opt_u64(&self, key: &str) -> FramecutResult<Option<u64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => match (n.as_u64(), n.as_i64()) {
                (Some(u), _) => Ok(Some(u)),
                (None, Some(i)) => Ok(Some(i as u64)),
                _ => Err(self.invalid(key, "an integer")),
            },
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|i| Some(i as u64))
                .map_err(|_| self.invalid(key, "an integer")),
            Some(_) => Err(self.invalid(key, "an integer")),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> FramecutResult<bool> {
        match self.params.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => s
                .trim()
                .to_ascii_lowercase()
                .parse::<bool>()
                .map_err(|_| self.invalid(key, "a boolean")),
            Some(_) => Err(self.invalid(key, "a boolean")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/registry.rs"]
mod tests;
