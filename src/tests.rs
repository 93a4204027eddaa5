use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::formats::BUILTIN_FORMATS;
use crate::{self as gvox, ErrorType, FormatCapabilities, GvoxError, Payload, Scene, SceneNode, Voxel};
use int_enum::IntEnum;


fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Pops the single outstanding error, failing if there is not exactly one.
fn pop_only_error(ctx: &mut gvox::Context) -> GvoxError {
    assert_eq!(ctx.result_count(), 1, "expected exactly one error");
    let err = ctx.pop_result().expect("error stack is empty");
    assert_eq!(ctx.result(), None);
    assert_eq!(ctx.result_code(), 0);
    err
}

#[test]
fn lossless_formats_round_trip_terrain() {
    init_logging();
    let mut ctx = gvox::Context::new();
    let scene = procedural::terrain_scene(21, 16, 19);
    for format in ["gvox_raw", "gvox_u32_palette", "zlib", "gzip"] {
        let payload = ctx
            .serialize(&scene, format)
            .unwrap_or_else(|e| panic!("serialize {format}: {e}"));
        let parsed = ctx
            .parse(&payload, format)
            .unwrap_or_else(|e| panic!("parse {format}: {e}"));
        assert_eq!(parsed, scene, "{format}");
        ctx.destroy_payload(payload, format).unwrap();
        ctx.destroy_scene(parsed);
    }
    assert_eq!(ctx.result_count(), 0);
}

#[test]
fn palette_beats_raw_on_terrain() {
    let mut ctx = gvox::Context::new();
    let scene = procedural::terrain_scene(32, 32, 32);
    let raw = ctx.serialize(&scene, "gvox_raw").unwrap();
    let palette = ctx.serialize(&scene, "gvox_u32_palette").unwrap();
    assert!(palette.size() * 4 < raw.size());
}

#[test]
fn palette_round_trips_noise() {
    let mut ctx = gvox::Context::new();
    let scene = procedural::noise_scene(12, 9, 17);
    let payload = ctx.serialize(&scene, "gvox_u32_palette").unwrap();
    assert_eq!(ctx.parse(&payload, "gvox_u32_palette").unwrap(), scene);
}

#[test]
fn u32_format_quantizes_colors() {
    let mut ctx = gvox::Context::new();
    let scene = procedural::terrain_scene(8, 8, 8);
    let payload = ctx.serialize(&scene, "gvox_u32").unwrap();
    assert_eq!(payload.size(), 8 + 24 + 4 * 512);
    let parsed = ctx.parse(&payload, "gvox_u32").unwrap();
    for (a, b) in scene.nodes[0].voxels().iter().zip(parsed.nodes[0].voxels()) {
        assert_eq!(a.id, b.id);
        for channel in 0..3 {
            assert!((a.color[channel] - b.color[channel]).abs() <= 1.5 / 255.0);
        }
    }
}

#[test]
fn builtin_formats_load_lazily() {
    let mut ctx = gvox::Context::new();
    assert!(ctx.format_names().is_empty());
    let scene = Scene::from_node(SceneNode::new(2, 2, 2));
    ctx.serialize(&scene, "gvox_raw").unwrap();
    assert_eq!(ctx.format_names(), vec!["gvox_raw"]);

    for name in BUILTIN_FORMATS {
        ctx.load_format(name).unwrap();
        assert_eq!(ctx.format_capabilities(name), Some(FormatCapabilities::all()));
    }
    assert_eq!(ctx.format_names().len(), BUILTIN_FORMATS.len());
    assert_eq!(ctx.result_count(), 0);
}

#[test]
fn parse_with_unknown_format() {
    init_logging();
    let mut ctx = gvox::Context::new();
    let payload = Payload::from_slice(&[1, 2, 3]);
    let res = ctx.parse(&payload, "nonexistent_format");
    assert!(matches!(
        res.as_ref().map_err(GvoxError::error_type),
        Err(ErrorType::FailedToLoadFormat)
    ));
    assert_eq!(ctx.result(), Some(ErrorType::FailedToLoadFormat));
    assert_eq!(ctx.result_code(), -2);
    let err = pop_only_error(&mut ctx);
    assert_eq!(Err(err), res);
    assert!(!ctx.has_format("nonexistent_format"));
}

#[test]
fn serialize_with_unknown_format() {
    let mut ctx = gvox::Context::new();
    let scene = Scene::from_node(SceneNode::new(1, 1, 1));
    let mut dst = vec![0xAA];
    let err = ctx.serialize_into(&scene, "magicavoxel", &mut dst).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FailedToLoadFormat);
    assert_eq!(dst, vec![0xAA]);
    pop_only_error(&mut ctx);

    let err = ctx.load_format("magicavoxel").unwrap_err();
    assert_eq!(pop_only_error(&mut ctx), err);
}

#[test]
fn malformed_palette_payload() {
    let mut ctx = gvox::Context::new();
    let mut node = SceneNode::new(4, 4, 4);
    node.voxels_mut().fill(Voxel::new([1.0, 0.0, 0.0], 7));
    let mut bytes = ctx
        .serialize(&Scene::from_node(node), "gvox_u32_palette")
        .unwrap()
        .into_bytes();
    *bytes.last_mut().unwrap() = 3;

    let err = ctx
        .parse(&Payload::from(bytes), "gvox_u32_palette")
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::InvalidFormat);
    assert_eq!(pop_only_error(&mut ctx).error_type(), ErrorType::InvalidFormat);
}

#[test]
fn serialize_into_appends() {
    let mut ctx = gvox::Context::new();
    let scene = Scene::from_node(SceneNode::new(4, 4, 4));
    let expected = ctx.serialize(&scene, "gvox_u32_palette").unwrap();
    let mut dst = b"gvox".to_vec();
    let written = ctx
        .serialize_into(&scene, "gvox_u32_palette", &mut dst)
        .unwrap();
    assert_eq!(written as u64, expected.size());
    assert_eq!(&dst[..4], b"gvox");
    assert_eq!(&dst[4..], expected.as_bytes());
}

#[test]
fn result_message_size_then_fill() {
    let mut ctx = gvox::Context::new();
    assert_eq!(ctx.copy_result_message(&mut [0u8; 0]), 0);
    let _ = ctx.parse(&Payload::new(), "gvox_raw");

    let size = ctx.copy_result_message(&mut [0u8; 0]);
    let mut buf = vec![0; size];
    assert_eq!(ctx.copy_result_message(&mut buf), size);
    let message = std::str::from_utf8(&buf).unwrap();
    assert_eq!(Some(message), ctx.result_message());
    assert!(message.contains("unexpected end of payload"), "{message}");

    let mut short = [0u8; 4];
    assert_eq!(ctx.copy_result_message(&mut short), size);
    assert_eq!(&short, &buf[..4]);
}

#[test]
fn result_stack_is_bounded_and_lifo() {
    let mut ctx = gvox::Context::with_config(gvox::ContextConfig { max_results: 2 });
    let payload = Payload::new();
    for format in ["a", "b", "gvox_raw"] {
        assert!(ctx.parse(&payload, format).is_err());
    }
    assert_eq!(ctx.result_count(), 2);
    assert_eq!(ctx.pop_result().map(|e| e.error_type()), Some(ErrorType::InvalidFormat));
    let err = ctx.pop_result().unwrap();
    assert!(err.message().contains("'b'"), "{err}");
    assert!(ctx.pop_result().is_none());
}

#[test]
fn error_codes() {
    assert_eq!(ErrorType::FailedToLoadFile.code(), -1);
    assert_eq!(ErrorType::FailedToLoadFormat.int_value(), -2);
    assert_eq!(ErrorType::from_int(-3).ok(), Some(ErrorType::InvalidFormat));
    assert!(ErrorType::from_int(0).is_err());
    let err = GvoxError::new(ErrorType::InvalidFormat, "bad chunk");
    assert_eq!(err.to_string(), "invalid format: bad chunk");
}

/// Writes a single tag byte per node and counts how often it is destroyed.
pub struct TaggedFormat {
    tag: u8,
    destroyed: Arc<AtomicUsize>,
}

impl TaggedFormat {
    fn new(tag: u8, destroyed: &Arc<AtomicUsize>) -> Self {
        Self {
            tag,
            destroyed: destroyed.clone(),
        }
    }
}

impl gvox::NamedFormat for TaggedFormat {
    fn name() -> &'static str {
        "tagged"
    }
}

impl gvox::FormatDescriptor for TaggedFormat {
    type Handler = Self;
}

impl gvox::FormatHandler for TaggedFormat {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self::new(0, &Arc::default()))
    }

    fn destroy(self) -> Result<(), GvoxError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        Ok(vec![self.tag; scene.nodes.len()].into())
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        let mut scene = Scene::new();
        for &tag in payload.as_bytes() {
            let mut node = SceneNode::new(1, 1, 1);
            node.set(0, 0, 0, Voxel::new([0.0; 3], u32::from(tag)));
            scene.push_node(node);
        }
        Ok(scene)
    }
}

#[test]
fn custom_format_registration() {
    init_logging();
    let mut ctx = gvox::Context::new();
    ctx.register_format::<TaggedFormat>().unwrap();
    assert!(ctx.has_format("tagged"));

    let mut scene = Scene::from_node(SceneNode::new(3, 3, 3));
    scene.push_node(SceneNode::new(0, 0, 0));
    let payload = ctx.serialize(&scene, "tagged").unwrap();
    assert_eq!(payload.as_bytes(), &[0, 0]);
    let parsed = ctx.parse(&Payload::from_slice(&[5, 6, 7]), "tagged").unwrap();
    assert_eq!(parsed.nodes.len(), 3);
    assert_eq!(parsed.nodes[2].voxels()[0].id, 7);
}

#[test]
fn replacing_a_format_destroys_the_old_handler_once() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    {
        let mut ctx = gvox::Context::new();
        ctx.register_format_info(gvox::FormatLoaderInfo::from_handler(
            "tagged",
            TaggedFormat::new(1, &first),
        ))
        .unwrap();
        let scene = Scene::from_node(SceneNode::new(1, 1, 1));
        assert_eq!(ctx.serialize(&scene, "tagged").unwrap().as_bytes(), &[1]);

        ctx.register_format_info(gvox::FormatLoaderInfo::from_handler(
            "tagged",
            TaggedFormat::new(2, &second),
        ))
        .unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.serialize(&scene, "tagged").unwrap().as_bytes(), &[2]);
        assert_eq!(ctx.format_names(), vec!["tagged"]);
    }
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn registered_format_shadows_builtin() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut ctx = gvox::Context::new();
    ctx.register_format_info(gvox::FormatLoaderInfo::from_handler(
        "gvox_raw",
        TaggedFormat::new(9, &destroyed),
    ))
    .unwrap();
    let scene = Scene::from_node(SceneNode::new(2, 2, 2));
    assert_eq!(ctx.serialize(&scene, "gvox_raw").unwrap().as_bytes(), &[9]);

    ctx.register_format_info(gvox::FormatLoaderInfo::of::<gvox::formats::GvoxRaw>())
        .unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    let payload = ctx.serialize(&scene, "gvox_raw").unwrap();
    assert_eq!(ctx.parse(&payload, "gvox_raw").unwrap(), scene);
}

#[test]
fn handler_registered_under_another_name() {
    let mut ctx = gvox::Context::new();
    ctx.register_format_info(gvox::FormatLoaderInfo::from_handler(
        "zlib_fast",
        gvox::formats::Zlib::with_level(1),
    ))
    .unwrap();
    ctx.register_format_info(gvox::FormatLoaderInfo::with_name::<gvox::formats::GvoxPalette>(
        "palette",
    ))
    .unwrap();
    let scene = procedural::terrain_scene(9, 9, 9);
    for format in ["zlib_fast", "palette"] {
        let payload = ctx.serialize(&scene, format).unwrap();
        assert_eq!(ctx.parse(&payload, format).unwrap(), scene);
    }
}

/// Only knows how to parse; every payload becomes an empty scene.
pub struct ParseOnly;

impl gvox::NamedFormat for ParseOnly {
    fn name() -> &'static str {
        "parse_only"
    }
}

impl gvox::FormatDescriptor for ParseOnly {
    type Handler = Self;
}

impl gvox::FormatHandler for ParseOnly {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self)
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities::PARSE
    }

    fn parse_payload(&mut self, _payload: &Payload) -> Result<Scene, GvoxError> {
        Ok(Scene::new())
    }
}

/// Claims every capability but implements none of them.
pub struct Hollow;

impl gvox::NamedFormat for Hollow {
    fn name() -> &'static str {
        "hollow"
    }
}

impl gvox::FormatDescriptor for Hollow {
    type Handler = Self;
}

impl gvox::FormatHandler for Hollow {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self)
    }
}

#[test]
fn missing_operations_fail_at_first_use() {
    let mut ctx = gvox::Context::new();
    ctx.register_format::<ParseOnly>().unwrap();
    ctx.register_format::<Hollow>().unwrap();
    assert_eq!(ctx.result_count(), 0);
    assert_eq!(ctx.format_capabilities("parse_only"), Some(FormatCapabilities::PARSE));

    let scene = Scene::from_node(SceneNode::new(1, 1, 1));
    assert_eq!(ctx.parse(&Payload::new(), "parse_only").unwrap(), Scene::new());
    for format in ["parse_only", "hollow"] {
        let err = ctx.serialize(&scene, format).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FailedToLoadFormat, "{format}");
        pop_only_error(&mut ctx);
    }
    let err = ctx.parse(&Payload::new(), "hollow").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FailedToLoadFormat);
    pop_only_error(&mut ctx);
}

pub struct Broken;

impl gvox::NamedFormat for Broken {
    fn name() -> &'static str {
        "broken"
    }
}

impl gvox::FormatDescriptor for Broken {
    type Handler = Self;
}

impl gvox::FormatHandler for Broken {
    fn create() -> Result<Self, GvoxError> {
        Err(GvoxError::new(ErrorType::InvalidFormat, "no state for you"))
    }
}

#[test]
fn failed_handler_creation_is_not_registered() {
    let mut ctx = gvox::Context::new();
    let err = ctx.register_format::<Broken>().unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FailedToLoadFormat);
    assert!(err.message().contains("no state for you"));
    assert!(!ctx.has_format("broken"));
    pop_only_error(&mut ctx);
}

#[test]
fn destroy_payload_of_unknown_format() {
    let mut ctx = gvox::Context::new();
    let err = ctx.destroy_payload(Payload::from_slice(&[1]), "nope").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FailedToLoadFormat);
    pop_only_error(&mut ctx);
}

#[test]
fn destroy_payload_loads_builtin() {
    let mut ctx = gvox::Context::new();
    let payload = gvox::Context::new()
        .serialize(&Scene::from_node(SceneNode::new(2, 2, 2)), "gvox_raw")
        .unwrap();
    assert!(!ctx.has_format("gvox_raw"));
    ctx.destroy_payload(payload, "gvox_raw").unwrap();
    assert!(ctx.has_format("gvox_raw"));
    assert_eq!(ctx.result_count(), 0);
}

#[cfg(feature = "file-io")]
mod file_io {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gvox-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn container_save_and_load() {
        init_logging();
        let dir = scratch_dir("container");
        let mut ctx = gvox::Context::new();
        let scene = procedural::terrain_scene(10, 12, 14);
        ctx.save(&scene, dir.join("terrain.gvox"), "gvox_u32_palette").unwrap();

        let header = ctx.load_header(dir.join("terrain.gvox")).unwrap();
        assert_eq!(header.format_name_size, "gvox_u32_palette".len() as u64);
        let payload = ctx.serialize(&scene, "gvox_u32_palette").unwrap();
        assert_eq!(header.payload_size, payload.size());

        assert_eq!(ctx.load(dir.join("terrain.gvox")).unwrap(), scene);
        assert_eq!(ctx.result_count(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn raw_files_and_root_paths() {
        let dir = scratch_dir("roots");
        let mut ctx = gvox::Context::new();
        let scene = procedural::noise_scene(3, 4, 5);

        ctx.push_root_path(&dir);
        ctx.save_as_raw(&scene, "noise.zlib", "zlib").unwrap();
        assert!(dir.join("noise.zlib").is_file());
        ctx.push_root_path(dir.join("missing"));
        assert_eq!(ctx.load_from_raw("noise.zlib", "zlib").unwrap(), scene);

        assert_eq!(ctx.pop_root_path(), Some(dir.join("missing")));
        assert_eq!(ctx.pop_root_path(), Some(dir.clone()));
        let err = ctx.load_from_raw("noise.zlib", "zlib").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FailedToLoadFile);
        pop_only_error(&mut ctx);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn corrupt_containers() {
        let dir = scratch_dir("corrupt");
        let mut ctx = gvox::Context::new();
        let path = dir.join("bad.gvox");

        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let err = ctx.load(&path).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FailedToLoadFile);
        pop_only_error(&mut ctx);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u64.to_le_bytes());
        bytes.extend_from_slice(&100u64.to_le_bytes());
        bytes.extend_from_slice(b"zlib");
        std::fs::write(&path, &bytes).unwrap();
        let err = ctx.load(&path).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FailedToLoadFile);
        pop_only_error(&mut ctx);

        bytes[8..16].copy_from_slice(&3u64.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        std::fs::write(&path, &bytes).unwrap();
        let err = ctx.load(&path).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::InvalidFormat);
        pop_only_error(&mut ctx);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
