//! Format dispatch and the load pipeline.
//!
//! [`load`] runs one source synchronously through parse and normalize.
//! [`AssetLoader`] runs the same pipeline off the render loop (a blocking
//! tokio task natively, a `spawn_local` task that yields to the browser
//! between stages on the web) and hands back a
//! [`PendingLoad`] the viewer polls every frame. Every started load takes a
//! [`LoadTicket`]; starting another load invalidates all earlier tickets, and
//! results carrying an outdated ticket are dropped instead of shown.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;

use futures::channel::oneshot;

#[cfg(target_arch = "wasm32")]
use crate::resources::bundle::BundleJob;

use crate::{
    config::ViewerConfig,
    data_structures::asset::{Asset, AssetFormat, ParsedAsset},
    error::{LoadError, LoadResult},
    normalize::normalize,
    progress::{LoadPhase, LoadProgress},
    resources::{
        AssetSource,
        bundle::{self, BundleOptions, UnpackLimits},
        gltf, obj, stl,
    },
};

/// Maps a lower-case file extension to the parser that handles it.
pub fn detect_format(extension: &str) -> LoadResult<AssetFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "stl" => Ok(AssetFormat::TriangleSoup),
        "obj" => Ok(AssetFormat::MeshText),
        "glb" | "gltf" => Ok(AssetFormat::SceneBinary),
        "zip" => Ok(AssetFormat::Bundle),
        _ => Err(LoadError::unsupported(extension)),
    }
}

/// A normalized asset plus everything that went wrong without failing the load.
#[derive(Debug)]
pub struct LoadOutcome {
    pub asset: Asset,
    pub warnings: Vec<LoadError>,
}

fn bundle_options(config: &ViewerConfig) -> BundleOptions {
    BundleOptions {
        default_color: config.default_color,
        limits: UnpackLimits::with_depth(config.max_archive_depth),
    }
}

/// Picks the parser for `source` and checks it may run under `config`.
fn prepare(source: &AssetSource, config: &ViewerConfig) -> LoadResult<AssetFormat> {
    let extension = source.extension().unwrap_or_default();
    let format = detect_format(&extension)?;
    if !config.is_extension_allowed(&extension) {
        return Err(LoadError::unsupported(extension));
    }
    config
        .validate()
        .map_err(|e| LoadError::parse_chain(format, &e.context("invalid viewer configuration")))?;
    log::info!("Loading {} ({} bytes) as {format}", source.name, source.bytes.len());
    Ok(format)
}

fn parse(
    format: AssetFormat,
    source: &AssetSource,
    config: &ViewerConfig,
    progress: &LoadProgress,
) -> LoadResult<(ParsedAsset, Vec<LoadError>)> {
    match format {
        AssetFormat::TriangleSoup => {
            progress.set_phase(LoadPhase::ParsingMesh, 25);
            Ok((stl::load(&source.bytes, config.default_color)?, Vec::new()))
        }
        AssetFormat::MeshText => {
            progress.set_phase(LoadPhase::ParsingMesh, 25);
            let mode = obj::MaterialMode::Follow(source.resolver());
            let output = obj::load(&source.bytes, mode, config.default_color)?;
            Ok((output.asset, output.warnings))
        }
        AssetFormat::SceneBinary => {
            progress.set_phase(LoadPhase::ParsingMesh, 25);
            let output = gltf::load(&source.bytes, source.resolver())?;
            Ok((output.asset, output.warnings))
        }
        AssetFormat::Bundle => {
            let output = bundle::load(&source.bytes, &bundle_options(config), progress)?;
            Ok((output.asset, output.warnings))
        }
    }
}

fn conclude(
    source: &AssetSource,
    parsed: ParsedAsset,
    warnings: Vec<LoadError>,
    config: &ViewerConfig,
    progress: &LoadProgress,
) -> LoadOutcome {
    progress.set_phase(LoadPhase::Normalizing, 90);
    let asset = normalize(parsed, config.target_size);
    log::info!(
        "Loaded {} with {} parts and {} warnings",
        source.name,
        asset.part_count(),
        warnings.len()
    );
    LoadOutcome { asset, warnings }
}

fn settle_progress(
    name: &str,
    progress: &LoadProgress,
    result: LoadResult<LoadOutcome>,
) -> LoadResult<LoadOutcome> {
    match &result {
        Ok(_) => progress.complete(),
        Err(e) => {
            log::error!("Loading {name} failed: {e}");
            progress.fail();
        }
    }
    result
}

/// Runs one source through dispatch, parsing and normalization.
///
/// The extension must be both known and allowed by the configuration, and the
/// configuration itself must be valid; the bytes are not looked at before that.
pub fn load(source: &AssetSource, config: &ViewerConfig, progress: &LoadProgress) -> LoadResult<LoadOutcome> {
    let result = (|| -> LoadResult<LoadOutcome> {
        let format = prepare(source, config)?;
        let (parsed, warnings) = parse(format, source, config, progress)?;
        Ok(conclude(source, parsed, warnings, config, progress))
    })();
    settle_progress(&source.name, progress, result)
}

/// Lets the browser render and handle input before the next step runs.
#[cfg(target_arch = "wasm32")]
async fn yield_to_event_loop() {
    use wasm_bindgen::{JsCast, JsValue};

    let promise = js_sys::Promise::new(&mut |resolve, _| {
        let scheduled = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("setTimeout"))
            .ok()
            .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
            .is_some_and(|set_timeout| {
                set_timeout
                    .call2(&JsValue::NULL, &resolve, &JsValue::from(0))
                    .is_ok()
            });
        // Without a timer there is nothing to wait for
        if !scheduled {
            let _ = resolve.call0(&JsValue::NULL);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

/// [`load`] for the browser main thread: yields between stages and after
/// every texture of a bundle so frames keep coming while it runs.
#[cfg(target_arch = "wasm32")]
async fn load_yielding(
    source: &AssetSource,
    config: &ViewerConfig,
    progress: &LoadProgress,
) -> LoadResult<LoadOutcome> {
    let result = async {
        let format = prepare(source, config)?;
        yield_to_event_loop().await;
        let (parsed, warnings) = if format == AssetFormat::Bundle {
            let mut job = BundleJob::unpack(&source.bytes, &bundle_options(config), progress)?;
            yield_to_event_loop().await;
            while job.decode_next() {
                yield_to_event_loop().await;
            }
            let output = job.finish()?;
            (output.asset, output.warnings)
        } else {
            parse(format, source, config, progress)?
        };
        yield_to_event_loop().await;
        Ok(conclude(source, parsed, warnings, config, progress))
    }
    .await;
    settle_progress(&source.name, progress, result)
}

/// Hands out tickets; only the most recently issued one is current.
#[derive(Debug, Clone, Default)]
pub struct LoadTracker {
    latest: Arc<AtomicU64>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new load generation, making every earlier ticket stale.
    pub fn begin(&self) -> LoadTicket {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            generation,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Makes every outstanding ticket stale without starting a new load.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }
}

/// Where the bytes of a background load come from.
pub enum LoadRequest {
    Source(AssetSource),
    #[cfg(not(target_arch = "wasm32"))]
    Path(PathBuf),
}

impl From<AssetSource> for LoadRequest {
    fn from(source: AssetSource) -> Self {
        LoadRequest::Source(source)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<PathBuf> for LoadRequest {
    fn from(path: PathBuf) -> Self {
        LoadRequest::Path(path)
    }
}

/// State of a background load as seen by whoever polls it.
#[derive(Debug)]
pub enum LoadStatus {
    InFlight,
    Finished(LoadResult<LoadOutcome>),
    /// A newer load started (or the loader shut down) before this one finished.
    Discarded,
}

/// A background load that hasn't been collected yet.
pub struct PendingLoad {
    name: String,
    ticket: LoadTicket,
    progress: LoadProgress,
    receiver: oneshot::Receiver<LoadResult<LoadOutcome>>,
}

impl PendingLoad {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn progress(&self) -> &LoadProgress {
        &self.progress
    }

    pub fn is_current(&self) -> bool {
        self.ticket.is_current()
    }

    fn settle(&self, result: Result<LoadResult<LoadOutcome>, oneshot::Canceled>) -> LoadStatus {
        match result {
            Ok(_) if !self.ticket.is_current() => {
                log::warn!("Discarding stale load of {}", self.name);
                LoadStatus::Discarded
            }
            Ok(result) => LoadStatus::Finished(result),
            Err(oneshot::Canceled) => {
                log::error!("Load of {} ended without a result", self.name);
                LoadStatus::Discarded
            }
        }
    }

    /// Non-blocking check, meant to be called once per frame.
    pub fn poll(&mut self) -> LoadStatus {
        match self.receiver.try_recv() {
            Ok(None) => LoadStatus::InFlight,
            Ok(Some(result)) => self.settle(Ok(result)),
            Err(canceled) => self.settle(Err(canceled)),
        }
    }

    /// Waits for the result.
    pub async fn finish(mut self) -> LoadStatus {
        let result = (&mut self.receiver).await;
        self.settle(result)
    }
}

/// Runs loads in the background, one current load at a time.
pub struct AssetLoader {
    config: Arc<ViewerConfig>,
    tracker: LoadTracker,
    #[cfg(not(target_arch = "wasm32"))]
    runtime: tokio::runtime::Handle,
}

impl AssetLoader {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(config: Arc<ViewerConfig>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            config,
            tracker: LoadTracker::new(),
            runtime,
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn new(config: Arc<ViewerConfig>) -> Self {
        Self {
            config,
            tracker: LoadTracker::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Replaces the configuration used by loads started from now on.
    pub fn set_config(&mut self, config: Arc<ViewerConfig>) {
        self.config = config;
    }

    /// Starts loading `request`; any load still in flight becomes stale.
    pub fn start(&self, request: impl Into<LoadRequest>) -> PendingLoad {
        let request = request.into();
        let name = match &request {
            LoadRequest::Source(source) => source.name.clone(),
            #[cfg(not(target_arch = "wasm32"))]
            LoadRequest::Path(path) => path.display().to_string(),
        };
        let ticket = self.tracker.begin();
        let progress = LoadProgress::new();
        let (sender, receiver) = oneshot::channel();

        let config = Arc::clone(&self.config);

        #[cfg(not(target_arch = "wasm32"))]
        {
            let progress = progress.clone();
            drop(self.runtime.spawn_blocking(move || {
                let result = run_request(request, &config, &progress);
                // The receiver is gone when nobody waits for this load anymore
                let _ = sender.send(result);
            }));
        }
        #[cfg(target_arch = "wasm32")]
        {
            let progress = progress.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let LoadRequest::Source(source) = request;
                progress.set_phase(LoadPhase::Reading, 0);
                let result = load_yielding(&source, &config, &progress).await;
                let _ = sender.send(result);
            });
        }

        PendingLoad {
            name,
            ticket,
            progress,
            receiver,
        }
    }

    /// Makes every load in flight stale, e.g. when the viewport goes away.
    pub fn cancel_all(&self) {
        self.tracker.invalidate();
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run_request(
    request: LoadRequest,
    config: &ViewerConfig,
    progress: &LoadProgress,
) -> LoadResult<LoadOutcome> {
    progress.set_phase(LoadPhase::Reading, 0);
    let source = match request {
        LoadRequest::Source(source) => source,
        #[cfg(not(target_arch = "wasm32"))]
        LoadRequest::Path(path) => {
            let extension =
                crate::resources::texture::extension_of(&path.to_string_lossy()).unwrap_or_default();
            // Unknown formats fail before any byte is read
            let format = detect_format(&extension)?;
            AssetSource::from_path(&path, progress).map_err(|e| {
                let err = LoadError::parse_chain(format, &e.context(format!("reading {}", path.display())));
                log::error!("{err}");
                progress.fail();
                err
            })?
        }
    };
    load(&source, config, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_to_formats() {
        assert_eq!(detect_format("stl"), Ok(AssetFormat::TriangleSoup));
        assert_eq!(detect_format("OBJ"), Ok(AssetFormat::MeshText));
        assert_eq!(detect_format("glb"), Ok(AssetFormat::SceneBinary));
        assert_eq!(detect_format("gltf"), Ok(AssetFormat::SceneBinary));
        assert_eq!(detect_format("zip"), Ok(AssetFormat::Bundle));
        assert_eq!(detect_format("fbx"), Err(LoadError::unsupported("fbx")));
    }

    #[test]
    fn unknown_extension_fails_without_parsing() {
        let progress = LoadProgress::new();
        let source = AssetSource::from_bytes("scene.blend", b"whatever".to_vec());
        let result = load(&source, &ViewerConfig::default(), &progress);
        assert!(matches!(result, Err(LoadError::UnsupportedFormat { .. })));
        assert_eq!(progress.phase(), LoadPhase::Failed);
    }

    #[test]
    fn disallowed_extension_is_unsupported() {
        let config = ViewerConfig {
            supported_extensions: vec!["stl".to_string()],
            ..Default::default()
        };
        let source = AssetSource::from_bytes("model.obj", b"v 0 0 0\n".to_vec());
        let result = load(&source, &config, &LoadProgress::new());
        assert_eq!(result.map(|_| ()), Err(LoadError::unsupported("obj")));
    }

    #[test]
    fn invalid_config_fails_before_parsing() {
        let config = ViewerConfig {
            target_size: 0.0,
            ..Default::default()
        };
        let progress = LoadProgress::new();
        let source = AssetSource::from_bytes("model.obj", b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".to_vec());
        let result = load(&source, &config, &progress);
        assert!(matches!(
            &result,
            Err(LoadError::ParseFailure { format: AssetFormat::MeshText, cause }) if cause.contains("target_size")
        ));
        assert_eq!(progress.phase(), LoadPhase::Failed);
    }

    #[test]
    fn mislabelled_bytes_surface_as_parse_failure() {
        let source = AssetSource::from_bytes("model.zip", b"solid x\nendsolid x\n".to_vec());
        let result = load(&source, &ViewerConfig::default(), &LoadProgress::new());
        assert!(matches!(
            result,
            Err(LoadError::ParseFailure { format: AssetFormat::Bundle, .. })
        ));
    }

    #[test]
    fn only_the_latest_ticket_is_current() {
        let tracker = LoadTracker::new();
        let first = tracker.begin();
        assert!(first.is_current());
        let second = tracker.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.generation() > first.generation());
        tracker.invalidate();
        assert!(!second.is_current());
    }
}
