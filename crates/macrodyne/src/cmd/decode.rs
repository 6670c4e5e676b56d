use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use bytes::Bytes;
use macrodyne_parser::{DecodedFrame, FrameParser, ParserError};
use tracing::{debug, info, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, parser_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, print_raw, OutputFormat};

struct Channels {
    frames: Receiver<DecodedFrame>,
    errors: Receiver<Arc<ParserError>>,
    images: Option<Receiver<Bytes>>,
}

#[derive(Debug, Default)]
struct Tally {
    bytes: u64,
    frames: usize,
    errors: usize,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut parser = FrameParser::with_config(args.settings.parser_config());
    if parser.descriptor_path().is_some() && parser.configuration().is_none() {
        parser
            .refresh_configuration()
            .map_err(|err| parser_error("descriptor load failed", err))?;
    }

    let channels = Channels {
        frames: parser.subscribe_frames(),
        errors: parser.subscribe_errors(),
        images: matches!(format, OutputFormat::Raw).then(|| parser.subscribe_frame_images()),
    };

    let mut source = open_source(&args.input)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    parser.start();
    let mut buf = vec![0u8; args.chunk_size.max(1)];
    let mut tally = Tally::default();

    while running.load(Ordering::SeqCst) {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("read failed", err)),
        };
        tally.bytes += n as u64;
        parser
            .write(&buf[..n])
            .map_err(|err| parser_error("write failed", err))?;

        if emit(&channels, format, args.count, &mut tally) {
            break;
        }
    }
    parser.stop();
    emit(&channels, format, args.count, &mut tally);

    info!(
        bytes = tally.bytes,
        frames = tally.frames,
        errors = tally.errors,
        "decode finished"
    );

    if tally.frames == 0 && tally.errors > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no frames decoded ({} errors)", tally.errors),
        ));
    }
    Ok(SUCCESS)
}

fn open_source(input: &Path) -> CliResult<Box<dyn Read>> {
    if input == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(input)
        .map_err(|err| io_error(&format!("open {} failed", input.display()), err))?;
    debug!(path = ?input, "decoding capture file");
    Ok(Box::new(file))
}

/// Print whatever the parser produced so far. Returns true once `limit`
/// frames were printed.
fn emit(
    channels: &Channels,
    format: OutputFormat,
    limit: Option<usize>,
    tally: &mut Tally,
) -> bool {
    for error in channels.errors.try_iter() {
        tally.errors += 1;
        warn!(error = %error, "frame rejected");
    }

    if let Some(images) = &channels.images {
        for image in images.try_iter() {
            print_raw(&image);
        }
    }

    for frame in channels.frames.try_iter() {
        if limit.is_some_and(|limit| tally.frames >= limit) {
            return true;
        }
        print_frame(&frame, format);
        tally.frames += 1;
    }
    limit.is_some_and(|limit| tally.frames >= limit)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
