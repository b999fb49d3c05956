use super::*;

fn args_as_strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

fn unchecked(format: OutputFormat, out: &str) -> VideoAssembler {
    VideoAssembler {
        opts: AssemblerOpts::new(out, 2, format),
    }
}

#[test]
fn format_parsing() {
    assert_eq!("mp4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
    assert_eq!(" GIF ".parse::<OutputFormat>().unwrap(), OutputFormat::Gif);
    assert!(matches!(
        "avi".parse::<OutputFormat>(),
        Err(ChronoError::InvalidOption(ref m)) if m.contains("avi")
    ));
    assert_eq!(OutputFormat::Gif.extension(), "gif");
    assert_eq!(OutputFormat::Mp4.to_string(), "mp4");
}

#[test]
fn mp4_args_use_x264_yuv420p() {
    let a = unchecked(OutputFormat::Mp4, "/out/v.mp4");
    let args = args_as_strings(&a.encoder_args(Path::new("/tmp/list.txt")));
    assert_eq!(args[0], "-y");
    let joined = args.join(" ");
    assert!(joined.contains("-r 2 -f concat -safe 0 -i /tmp/list.txt"));
    assert!(joined.contains("-c:v libx264 -pix_fmt yuv420p -preset medium"));
    assert!(!joined.contains("palettegen"));
    assert_eq!(args.last().map(String::as_str), Some("/out/v.mp4"));
}

#[test]
fn gif_args_use_palette_filter_graph() {
    let a = unchecked(OutputFormat::Gif, "/out/v.gif");
    let args = args_as_strings(&a.encoder_args(Path::new("/tmp/list.txt")));
    let idx = args.iter().position(|a| a == "-filter_complex").unwrap();
    assert_eq!(args[idx + 1], GIF_FILTER);
    assert!(!args.iter().any(|a| a == "libx264"));
    assert_eq!(args.last().map(String::as_str), Some("/out/v.gif"));
}

#[test]
fn manifest_lines_escape_quotes() {
    assert_eq!(
        manifest_line(Path::new("/tmp/frame_00000.png")),
        "file '/tmp/frame_00000.png'"
    );
    assert_eq!(
        manifest_line(Path::new("/tmp/it's/frame.png")),
        r"file '/tmp/it'\''s/frame.png'"
    );
}

#[test]
fn missing_encoder_fails_at_construction() {
    let opts = AssemblerOpts::new("out.mp4", 2, OutputFormat::Mp4)
        .with_program("/definitely/not/an/encoder-binary");
    assert!(matches!(
        VideoAssembler::new(opts),
        Err(ChronoError::EncoderUnavailable(_))
    ));
}

#[test]
fn zero_fps_is_invalid() {
    let opts = AssemblerOpts::new("out.mp4", 0, OutputFormat::Mp4);
    assert!(matches!(
        VideoAssembler::new(opts),
        Err(ChronoError::InvalidOption(_))
    ));
}

#[test]
fn empty_frame_list_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/out.mp4");
    let a = unchecked(OutputFormat::Mp4, out.to_str().unwrap());
    a.assemble(&[], dir.path()).unwrap();
    assert!(!out.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[cfg(unix)]
mod fake_encoder {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    const COPY_MANIFEST: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then manifest="$arg"; fi
  prev="$arg"
  out="$arg"
done
cp "$manifest" "$out"
"#;

    const FAIL: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
echo "moov atom not found" >&2
exit 1
"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn frames(dir: &Path, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let p = dir.join(format!("frame_{i:05}.png"));
                std::fs::write(&p, b"png").unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn manifest_lists_frames_in_order_and_is_removed() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let program = script(bin.path(), "ffmpeg-ok", COPY_MANIFEST);
        let out = out_dir.path().join("v.mp4");

        let frames = frames(scratch.path(), 3);
        let a = VideoAssembler::new(
            AssemblerOpts::new(&out, 2, OutputFormat::Mp4).with_program(&program),
        )
        .unwrap();
        a.assemble(&frames, scratch.path()).unwrap();

        let manifest = std::fs::read_to_string(&out).unwrap();
        let expected: Vec<String> = frames.iter().map(|f| manifest_line(f)).collect();
        assert_eq!(manifest.lines().collect::<Vec<_>>(), expected);

        let leftovers: Vec<_> = std::fs::read_dir(scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with("frame_"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn encoder_failure_carries_stderr_and_removes_manifest() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let program = script(bin.path(), "ffmpeg-fail", FAIL);
        let out = scratch.path().join("v.gif");

        let frames = frames(scratch.path(), 2);
        let a = VideoAssembler::new(
            AssemblerOpts::new(&out, 5, OutputFormat::Gif).with_program(&program),
        )
        .unwrap();
        let err = a.assemble(&frames, scratch.path()).unwrap_err();
        assert!(matches!(err, ChronoError::Encoding(ref m) if m.contains("moov atom not found")));

        let txt = std::fs::read_dir(scratch.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|x| x == "txt")
            })
            .count();
        assert_eq!(txt, 0);
    }
}
