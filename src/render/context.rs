use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::clip::Clip;
use crate::compute::ComputeBackend;
use crate::effects::{Effect, EffectRegistry, Mixture, MixtureMode};
use crate::foundation::error::FramecutResult;
use crate::picture::{BitDepth, Picture};
use crate::render::diagnostics::DiagnosticsReport;

/// State owned by one render pass and shared by every component that composes frames.
///
/// Effect instances are cached per clip and must not outlive the pass; continuous effects are
/// bound to the clip range they were created for.
pub struct RenderContext {
    backend: Arc<dyn ComputeBackend>,
    registry: Arc<EffectRegistry>,
    bit_depth: BitDepth,
    fallback: [u16; 3],
    effects: RwLock<HashMap<String, Arc<[Effect]>>>,
    mixtures: RwLock<HashMap<MixtureMode, Mixture>>,
    blank: Mutex<Option<Picture>>,
    diagnostics: Option<Arc<DiagnosticsReport>>,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.name())
            .field("bit_depth", &self.bit_depth)
            .field("fallback", &self.fallback)
            .field("effect_sets", &self.effects.read().len())
            .finish()
    }
}

impl RenderContext {
    pub fn new(backend: Arc<dyn ComputeBackend>, registry: Arc<EffectRegistry>) -> Self {
        Self {
            backend,
            registry,
            bit_depth: BitDepth::Sixteen,
            fallback: [0, 0, 0],
            effects: RwLock::new(HashMap::new()),
            mixtures: RwLock::new(HashMap::new()),
            blank: Mutex::new(None),
            diagnostics: None,
        }
    }

    pub fn with_bit_depth(mut self, depth: BitDepth) -> Self {
        self.bit_depth = depth;
        self
    }

    /// Opaque colour every composed frame is flattened onto.
    pub fn with_fallback(mut self, rgb: [u16; 3]) -> Self {
        self.fallback = rgb;
        self
    }

    pub fn with_diagnostics(mut self, report: Arc<DiagnosticsReport>) -> Self {
        self.diagnostics = Some(report);
        self
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticsReport> {
        self.diagnostics.as_deref()
    }

    /// Enabled effects of `clip` in ascending index order, instantiated once per pass.
    pub fn effects_for(&self, clip: &Clip) -> FramecutResult<Arc<[Effect]>> {
        if let Some(e) = self.effects.read().get(clip.id()) {
            return Ok(Arc::clone(e));
        }
        let info = clip.info();
        let mut built = Vec::with_capacity(info.effects.len());
        for spec in &info.effects {
            let effect = self
                .registry
                .build(spec)?
                .bind_to_clip(info.start_frame, info.span().unwrap_or(0));
            if effect.enabled() {
                built.push(effect);
            }
        }
        built.sort_by_key(Effect::index);
        let built: Arc<[Effect]> = built.into();
        let mut cache = self.effects.write();
        Ok(Arc::clone(
            cache.entry(clip.id().to_string()).or_insert(built),
        ))
    }

    pub fn mixture_for(&self, clip: &Clip) -> Mixture {
        let mode = clip.info().mixture_mode;
        if let Some(m) = self.mixtures.read().get(&mode) {
            return *m;
        }
        *self.mixtures.write().entry(mode).or_insert(Mixture::new(mode))
    }

    /// Opaque fallback-coloured frame of the given size, shared across blank frames.
    pub fn blank_frame(&self, width: u32, height: u32) -> FramecutResult<Picture> {
        let mut slot = self.blank.lock();
        if let Some(p) = slot.as_ref()
            && p.size() == (width, height)
        {
            return Ok(p.clone());
        }
        let p = Picture::solid(width, height, self.fallback, None)?
            .to_bit_depth(self.bit_depth)
            .with_step("blank");
        *slot = Some(p.clone());
        Ok(p)
    }

    /// Number of clips with cached effect instances.
    pub fn cached_effect_sets(&self) -> usize {
        self.effects.read().len()
    }

    /// Release effect instances, mixtures, the blank canvas and backend resources.
    pub fn release(&self) {
        for effects in self.effects.write().drain().map(|(_, e)| e) {
            for e in effects.iter() {
                e.release();
            }
        }
        self.mixtures.write().clear();
        self.blank.lock().take();
        self.backend.release();
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.release();
    }
}
