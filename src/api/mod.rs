//! HTTP API for threat detection uploads.
//!
//! A blocking `TcpListener` accept loop runs on its own thread; each accepted
//! connection is served on a short-lived worker thread so health checks stay
//! responsive during long video jobs. Uploads are either a
//! `multipart/form-data` form (`file`, `image` or `video` part plus an
//! optional `frame_interval` field) or the raw request body named by
//! `?filename=` / `X-Filename`. Either way the file is spooled to a temp file
//! that is removed when the request ends.

mod form;
mod http;

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;

use crate::analyzer::ThreatAnalyzer;
use crate::config::ApiSettings;
use crate::report::FailureReport;
use form::UploadedFile;
use http::{read_request, write_response, HttpRequest, RequestError, Response};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

const SERVICE_NAME: &str = "MarEye Threat Detection API";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: u64,
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_settings(&crate::config::MarEyeConfig::default().api)
    }
}

impl ApiConfig {
    pub fn from_settings(settings: &ApiSettings) -> Self {
        Self {
            addr: settings.addr.clone(),
            max_upload_bytes: settings.max_upload_bytes,
            allowed_origins: settings.allowed_origins.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    analyzer: Arc<ThreatAnalyzer>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, analyzer: Arc<ThreatAnalyzer>) -> Self {
        Self { cfg, analyzer }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let ctx = Arc::new(Context {
            cfg: self.cfg,
            analyzer: self.analyzer,
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        log::info!("detection api listening on {}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct Context {
    cfg: ApiConfig,
    analyzer: Arc<ThreatAnalyzer>,
}

fn run_api(listener: TcpListener, ctx: Arc<Context>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                std::thread::Builder::new()
                    .name("mareye-api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &ctx) {
                            log::warn!("detection api request from {} failed: {}", peer, err);
                        }
                    })?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &Context) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let response = Response::json(400, &FailureReport::new(err.to_string()))?;
            write_response(&mut stream, &response, &[])?;
            return Err(err.into());
        }
    };
    let cors = cors_headers(&request, &ctx.cfg.allowed_origins);

    let response = match route(&mut request, &mut stream, ctx) {
        Ok(response) => response,
        Err(err) => {
            log::error!("{} {} failed: {:#}", request.method, request.path, err);
            Response::json(500, &FailureReport::new("Internal server error"))?
        }
    };
    request.drain_body(&mut stream);
    write_response(&mut stream, &response, &cors)?;
    log::debug!("{} {} -> {}", request.method, request.path, response.status);
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadKind {
    Image,
    Video,
    /// Dispatch on the file extension.
    Any,
}

fn route(request: &mut HttpRequest, stream: &mut TcpStream, ctx: &Context) -> Result<Response> {
    let method = request.method.clone();
    if method == "OPTIONS" {
        return Ok(Response::empty(204));
    }
    let upload = match request.path.as_str() {
        "/" | "/health" | "/api/model/info" if method != "GET" => return method_not_allowed(),
        "/" => return Response::json(200, &service_info()),
        "/health" => return Response::json(200, &health(ctx)),
        "/api/model/info" => return Response::json(200, &model_info(ctx)),
        "/api/detect/image" => UploadKind::Image,
        "/api/detect/video" => UploadKind::Video,
        "/api/detect" => UploadKind::Any,
        _ => return Response::json(404, &FailureReport::new("Not found")),
    };
    if method != "POST" {
        return method_not_allowed();
    }
    handle_upload(request, stream, ctx, upload)
}

fn method_not_allowed() -> Result<Response> {
    Response::json(405, &FailureReport::new("Method not allowed"))
}

fn bad_request(message: impl Into<String>) -> Result<Response> {
    Response::json(400, &FailureReport::new(message))
}

/// Upload body after the file part (if any) has been located.
enum UploadBody {
    /// `multipart/form-data`, file part already spooled.
    Form(UploadedFile),
    /// Raw body, still unread on the connection.
    Raw(u64),
}

fn handle_upload(
    request: &mut HttpRequest,
    stream: &mut TcpStream,
    ctx: &Context,
    kind: UploadKind,
) -> Result<Response> {
    let length = match request.check_body_limit(ctx.cfg.max_upload_bytes) {
        Ok(length) => length,
        Err(RequestError::TooLarge { .. }) => {
            let message = format!(
                "File too large. Maximum size: {}MB",
                ctx.cfg.max_upload_bytes / (1024 * 1024)
            );
            return Response::json(413, &FailureReport::new(message));
        }
        Err(err) => return bad_request(err.to_string()),
    };

    let noun = match kind {
        UploadKind::Image => "an image",
        UploadKind::Video => "a video",
        UploadKind::Any => "a file",
    };
    let no_file = || bad_request(format!("No file provided. Please upload {}.", noun));

    let mut form_interval = None;
    let (raw_name, body) = if form::is_multipart(request.header("content-type")) {
        let file_fields: &[&str] = match kind {
            UploadKind::Image => &["file", "image"],
            UploadKind::Video => &["file", "video"],
            UploadKind::Any => &["file"],
        };
        let content_type = request.header("content-type").unwrap_or_default().to_string();
        let parsed = request
            .body_reader(stream)
            .and_then(|body| form::read_form(body, &content_type, file_fields));
        let mut form = match parsed {
            Ok(form) => form,
            Err(err) => return bad_request(err.to_string()),
        };
        form_interval = form.field("frame_interval").map(str::to_string);
        let Some(file) = form.file.take() else {
            return no_file();
        };
        (file.filename.clone(), UploadBody::Form(file))
    } else {
        let Some(name) = request
            .query_param("filename")
            .or_else(|| request.header("x-filename"))
        else {
            return no_file();
        };
        (name.to_string(), UploadBody::Raw(length))
    };

    let filename = secure_filename(&raw_name);
    if filename.is_empty() {
        return bad_request("No file selected");
    }
    let size = match &body {
        UploadBody::Form(file) => file.size,
        UploadBody::Raw(length) => *length,
    };
    if size == 0 {
        return no_file();
    }

    let ext = extension(&filename);
    let is_video = match kind {
        UploadKind::Image if IMAGE_EXTENSIONS.contains(&ext.as_str()) => false,
        UploadKind::Image => {
            return bad_request(format!("Invalid file type. Allowed: {}", IMAGE_EXTENSIONS.join(", ")))
        }
        UploadKind::Video if VIDEO_EXTENSIONS.contains(&ext.as_str()) => true,
        UploadKind::Video => {
            return bad_request(format!("Invalid file type. Allowed: {}", VIDEO_EXTENSIONS.join(", ")))
        }
        UploadKind::Any if IMAGE_EXTENSIONS.contains(&ext.as_str()) => false,
        UploadKind::Any if VIDEO_EXTENSIONS.contains(&ext.as_str()) => true,
        UploadKind::Any => {
            return bad_request(format!(
                "Unsupported file type. Allowed: images ({}) or videos ({})",
                IMAGE_EXTENSIONS.join(", "),
                VIDEO_EXTENSIONS.join(", ")
            ))
        }
    };

    let requested_interval = form_interval
        .as_deref()
        .or_else(|| request.query_param("frame_interval"));
    let frame_interval = match requested_interval {
        Some(value) if is_video => match value.trim().parse::<u32>() {
            Ok(n) if n > 0 => Some(n),
            _ => return bad_request("frame_interval must be a positive integer"),
        },
        _ => None,
    };

    let upload = match body {
        UploadBody::Form(file) => file.spool,
        UploadBody::Raw(_) => {
            let mut upload = tempfile::Builder::new()
                .prefix("mareye-upload-")
                .suffix(&format!(".{}", ext))
                .tempfile()?;
            if let Err(err) = request.copy_body(stream, upload.as_file_mut()) {
                return bad_request(err.to_string());
            }
            upload.as_file_mut().flush()?;
            upload
        }
    };
    log::info!("received {} ({} bytes)", filename, size);

    if is_video {
        detect_video(ctx, upload.path(), &filename, frame_interval)
    } else {
        detect_image(ctx, upload.path(), &filename)
    }
}

fn detect_image(ctx: &Context, path: &Path, filename: &str) -> Result<Response> {
    match ctx.analyzer.analyze_image(path) {
        Ok(analysis) => {
            let annotated = ctx.analyzer.annotated_data_uri(&analysis)?;
            let mut report = analysis.report;
            report.kind = Some("image".to_string());
            report.filename = Some(filename.to_string());
            report.annotated_image = annotated;
            Response::json(200, &report)
        }
        Err(err) => Response::json(200, &FailureReport::from(&err).for_upload("image", filename)),
    }
}

fn detect_video(ctx: &Context, path: &Path, filename: &str, frame_interval: Option<u32>) -> Result<Response> {
    match ctx.analyzer.analyze_video(path, frame_interval) {
        Ok(mut report) => {
            report.filename = Some(filename.to_string());
            Response::json(200, &report)
        }
        Err(err) => Response::json(200, &FailureReport::from(&err).for_upload("video", filename)),
    }
}

fn service_info() -> serde_json::Value {
    json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "endpoints": {
            "health_check": "/health",
            "detect_image": "/api/detect/image (POST)",
            "detect_video": "/api/detect/video (POST)",
            "detect_unified": "/api/detect (POST)",
            "model_info": "/api/model/info (GET)"
        },
        "documentation": "POST a multipart form with a 'file' field (or the raw body with ?filename=<name>) to /api/detect"
    })
}

fn health(ctx: &Context) -> serde_json::Value {
    let settings = ctx.analyzer.settings();
    json!({
        "status": "healthy",
        "service": "mareye-threat-detection",
        "model_loaded": ctx.analyzer.model_loaded(),
        "backend": ctx.analyzer.backend_name(),
        "model_path": settings.model_path.display().to_string(),
        "confidence_threshold": settings.confidence_threshold,
        "classes": ctx.analyzer.class_names(),
        "supported_formats": {
            "images": IMAGE_EXTENSIONS,
            "videos": VIDEO_EXTENSIONS
        }
    })
}

fn model_info(ctx: &Context) -> serde_json::Value {
    let settings = ctx.analyzer.settings();
    let classes = ctx.analyzer.class_names();
    let class_map: serde_json::Map<String, serde_json::Value> = classes
        .iter()
        .enumerate()
        .map(|(id, name)| (id.to_string(), json!(name)))
        .collect();
    json!({
        "success": true,
        "model_path": settings.model_path.display().to_string(),
        "confidence_threshold": settings.confidence_threshold,
        "classes": class_map,
        "class_count": classes.len()
    })
}

fn cors_headers(request: &HttpRequest, allowed: &[String]) -> Vec<(&'static str, String)> {
    let Some(origin) = request.header("origin") else {
        return Vec::new();
    };
    if !allowed.iter().any(|pattern| origin_matches(pattern, origin)) {
        return Vec::new();
    }
    vec![
        ("Access-Control-Allow-Origin", origin.to_string()),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS".to_string()),
        (
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Filename".to_string(),
        ),
        ("Access-Control-Allow-Credentials", "true".to_string()),
        ("Vary", "Origin".to_string()),
    ]
}

/// `*` in `pattern` matches any run of characters.
fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == origin,
        Some((prefix, suffix)) => {
            origin.len() >= prefix.len() + suffix.len()
                && origin.starts_with(prefix)
                && origin.ends_with(suffix)
        }
    }
}

/// Base name restricted to ASCII letters, digits, `.`, `-` and `_`.
fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_reduced_to_safe_base_names() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\scans\\reef scan.PNG"), "reef_scan.PNG");
        assert_eq!(secure_filename("..hidden.mp4"), "hidden.mp4");
        assert_eq!(secure_filename("ünïcode.jpg"), "ncode.jpg");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension("reef.PNG"), "png");
        assert_eq!(extension("archive.tar.gz"), "gz");
        assert_eq!(extension("noext"), "");
    }

    #[test]
    fn wildcard_origins_match_subdomains() {
        assert!(origin_matches("https://*.vercel.app", "https://mareye-pr-12.vercel.app"));
        assert!(!origin_matches("https://*.vercel.app", "https://vercel.app.evil.com"));
        assert!(origin_matches("http://localhost:3000", "http://localhost:3000"));
        assert!(!origin_matches("http://localhost:3000", "http://localhost:3001"));
        assert!(origin_matches("*", "https://anything.example"));
    }
}
