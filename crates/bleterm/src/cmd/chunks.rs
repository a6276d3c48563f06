use bleterm_frame::Fragmenter;
use bytes::Bytes;

use crate::cmd::ChunksArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_chunk_plan, OutputFormat};

pub fn run(args: ChunksArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.framing.frame_config()?;
    let fragmenter =
        Fragmenter::from_config(&config).map_err(|err| frame_error("invalid framing options", err))?;

    let message = args.data.as_bytes();
    let chunks: Vec<Bytes> = fragmenter.plan(message).collect();
    print_chunk_plan(
        message.len(),
        fragmenter.max_chunk_size(),
        fragmenter.separator(),
        &chunks,
        format,
    );

    Ok(SUCCESS)
}
