//! extract the H264 video stream of a Hikvision DVR recording
//!
//! The container format is undocumented and was worked out from recordings.
//! Packet boundaries come from walking the group and block records, which
//! may go wrong on recorder models we have not seen. `--raw` skips the walk
//! and copies everything after the file header.
//!
//! Usage:
//!     hik2h264 INFILENAME OUTFILENAME
use std::{
    fs::File,
    io::{prelude::*, BufReader, BufWriter},
    path::PathBuf,
};

use clap::Parser;
use eyre::Context;
use hikvision::{demux, HikDemuxer, PacketMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hik2h264")]
#[command(author, version)]
#[command(about = "Extract the raw H264 stream from a Hikvision recording")]
struct Cli {
    /// Recording to read
    input: PathBuf,

    /// Where to write the H264 stream; must not exist
    output: PathBuf,

    /// Copy fixed size chunks instead of walking the records
    #[arg(long)]
    raw: bool,

    /// Read size for --raw
    #[arg(long, default_value_t = demux::RAW_CHUNK_SIZE)]
    chunk_size: usize,

    /// Print the decoded file header and stream description
    #[arg(long)]
    dump_headers: bool,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let infilename = cli.input.display();
    let outfilename = cli.output.display();

    if !demux::has_hik_extension(&cli.input) {
        let ext = demux::EXTENSION;
        tracing::warn!("{infilename} does not have a .{ext} extension");
    }

    let f = File::open(&cli.input).with_context(|| format!("while opening {infilename}"))?;
    let mut reader = BufReader::new(f);

    let mut probe_buf = Vec::with_capacity(demux::PROBE_MIN_LEN);
    (&mut reader)
        .take(demux::PROBE_MIN_LEN as u64)
        .read_to_end(&mut probe_buf)
        .with_context(|| format!("while probing {infilename}"))?;
    if demux::probe(&probe_buf) == 0 {
        eyre::bail!("{infilename} is not a Hikvision recording");
    }

    let mode = if cli.raw {
        if cli.chunk_size == 0 {
            eyre::bail!("--chunk-size must be at least 1");
        }
        PacketMode::Raw {
            chunk_size: cli.chunk_size,
        }
    } else {
        PacketMode::Walker
    };
    let mut demuxer = HikDemuxer::with_mode(reader, mode)
        .with_context(|| format!("while reading header of {infilename}"))?;

    if cli.dump_headers {
        dbg_hex::dbg_hex!(demuxer.header());
        dbg_hex::dbg_hex!(demuxer.stream_info());
    }

    let out_fd =
        File::create_new(&cli.output).with_context(|| format!("while creating {outfilename}"))?;
    let mut wtr = BufWriter::new(out_fd);

    let mut packets = 0usize;
    let mut written = 0usize;
    while let Some(packet) = demuxer
        .read_packet()
        .with_context(|| format!("while demuxing {infilename} (packet {packets})"))?
    {
        wtr.write_all(&packet.data)?;
        packets += 1;
        written += packet.data.len();
    }
    wtr.flush()?;

    let info = demuxer.stream_info();
    println!(
        "wrote {written} bytes in {packets} packets to {outfilename} ({}x{})",
        info.width, info.height
    );
    if let Some(time) = demuxer.walker().record_time() {
        println!("last record time {time}");
    }
    Ok(())
}
