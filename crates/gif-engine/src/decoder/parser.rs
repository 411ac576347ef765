//! Block-level GIF parsing.
//!
//! The parser walks the stream once at open time, recording every frame's
//! descriptor and the offset of its image data while skipping the LZW
//! sub-blocks themselves. Pixel data is decoded later, one frame at a time.

use super::{
    APPLICATION_LABEL, COMMENT_LABEL, DisposalMethod, EXTENSION_INTRODUCER, FrameDescriptor,
    GIF87A_SIGNATURE, GIF89A_SIGNATURE, GRAPHIC_CONTROL_LABEL, GifInfo, IMAGE_SEPARATOR,
    TRAILER, argb, lzw::MIN_CODE_SIZE_RANGE,
};
use crate::error::DecodeError;
use crate::source::SourceReader;

/// Header and logical screen descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalScreen {
    pub width: u16,
    pub height: u16,
    pub global_palette: Option<Vec<u32>>,
    pub background_index: u8,
}

/// Graphic control extension, applied to the next image.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GraphicControl {
    disposal: DisposalMethod,
    delay_cs: u16,
    transparent_index: Option<u8>,
}

/// Read the signature, logical screen descriptor and global color table.
pub fn read_header(reader: &mut SourceReader) -> Result<LogicalScreen, DecodeError> {
    let mut sig = [0u8; 6];
    reader.fill(&mut sig)?;
    if &sig != GIF87A_SIGNATURE && &sig != GIF89A_SIGNATURE {
        return Err(DecodeError::InvalidHeader(format!(
            "bad signature {:?}",
            String::from_utf8_lossy(&sig)
        )));
    }

    let width = reader.read_u16_le()?;
    let height = reader.read_u16_le()?;
    let flags = reader.read_u8()?;
    let background_index = reader.read_u8()?;
    let _aspect = reader.read_u8()?;

    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidHeader(format!(
            "invalid screen dimensions {width}x{height}"
        )));
    }

    let global_palette = if flags & 0x80 != 0 {
        Some(read_palette(reader, flags & 0x07)?)
    } else {
        None
    };

    Ok(LogicalScreen {
        width,
        height,
        global_palette,
        background_index,
    })
}

/// Parse the whole stream structure. Bytes after the trailer are never read.
pub fn parse(reader: &mut SourceReader) -> Result<GifInfo, DecodeError> {
    let screen = read_header(reader)?;
    let mut info = GifInfo {
        width: screen.width,
        height: screen.height,
        global_palette: screen.global_palette,
        background_index: screen.background_index,
        loop_count: 0,
        comment: None,
        frames: Vec::new(),
        parse_error: None,
    };

    let mut control: Option<GraphicControl> = None;
    let mut comment: Option<Vec<u8>> = None;

    let stop = loop {
        let block_offset = reader.position();
        let introducer = match reader.read_u8() {
            Ok(b) => b,
            Err(e) => break Some(e),
        };
        match introducer {
            EXTENSION_INTRODUCER => {
                if let Err(e) = read_extension(reader, &mut info, &mut control, &mut comment) {
                    break Some(e);
                }
            }
            IMAGE_SEPARATOR => match read_image(reader, control.take()) {
                Ok((frame, None)) => info.frames.push(frame),
                Ok((frame, Some(e))) => {
                    info.frames.push(frame);
                    break Some(e);
                }
                Err(e) => break Some(e),
            },
            TRAILER => break None,
            other => {
                break Some(DecodeError::InvalidBlock(format!(
                    "unexpected block 0x{other:02X} at offset {block_offset}"
                )));
            }
        }
    };

    info.comment = comment.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    match stop {
        Some(e) if info.frames.is_empty() => Err(e),
        Some(e) => {
            log::warn!(
                "GIF stream damaged after {} frame(s), keeping what was read: {e}",
                info.frames.len()
            );
            info.parse_error = Some(e);
            Ok(info)
        }
        None if info.frames.is_empty() => Err(DecodeError::NoFrames),
        None => Ok(info),
    }
}

fn read_palette(reader: &mut SourceReader, size_bits: u8) -> Result<Vec<u32>, DecodeError> {
    let entries = 2usize << size_bits;
    let mut raw = vec![0u8; entries * 3];
    reader.fill(&mut raw)?;
    Ok(raw.chunks_exact(3).map(|c| argb(c[0], c[1], c[2])).collect())
}

fn read_extension(
    reader: &mut SourceReader,
    info: &mut GifInfo,
    control: &mut Option<GraphicControl>,
    comment: &mut Option<Vec<u8>>,
) -> Result<(), DecodeError> {
    let label = reader.read_u8()?;
    match label {
        GRAPHIC_CONTROL_LABEL => {
            let size = usize::from(reader.read_u8()?);
            if size < 4 {
                return Err(DecodeError::InvalidBlock(format!(
                    "graphic control extension of {size} bytes"
                )));
            }
            let mut data = vec![0u8; size];
            reader.fill(&mut data)?;
            let flags = data[0];
            *control = Some(GraphicControl {
                disposal: DisposalMethod::from_flags(flags),
                delay_cs: u16::from_le_bytes([data[1], data[2]]),
                transparent_index: (flags & 0x01 != 0).then_some(data[3]),
            });
            skip_sub_blocks(reader)
        }
        APPLICATION_LABEL => {
            let size = usize::from(reader.read_u8()?);
            let mut ident = vec![0u8; size];
            reader.fill(&mut ident)?;
            let looping = ident == b"NETSCAPE2.0" || ident == b"ANIMEXTS1.0";
            let block = read_sub_block(reader)?;
            if looping && block.len() >= 3 && block[0] == 1 {
                info.loop_count = u16::from_le_bytes([block[1], block[2]]);
            }
            if block.is_empty() {
                Ok(())
            } else {
                skip_sub_blocks(reader)
            }
        }
        COMMENT_LABEL => {
            let text = read_sub_blocks(reader)?;
            comment.get_or_insert_with(Vec::new).extend_from_slice(&text);
            Ok(())
        }
        _ => skip_sub_blocks(reader),
    }
}

/// Read an image descriptor and record where its data starts. A truncated
/// data section still yields the descriptor, paired with the error.
fn read_image(
    reader: &mut SourceReader,
    control: Option<GraphicControl>,
) -> Result<(FrameDescriptor, Option<DecodeError>), DecodeError> {
    let left = reader.read_u16_le()?;
    let top = reader.read_u16_le()?;
    let width = reader.read_u16_le()?;
    let height = reader.read_u16_le()?;
    let flags = reader.read_u8()?;

    let local_palette = if flags & 0x80 != 0 {
        Some(read_palette(reader, flags & 0x07)?)
    } else {
        None
    };

    let data_offset = reader.position();
    let min_code_size = reader.read_u8()?;
    if !MIN_CODE_SIZE_RANGE.contains(&min_code_size) {
        return Err(DecodeError::InvalidBlock(format!(
            "LZW minimum code size {min_code_size} at offset {data_offset}"
        )));
    }

    let control = control.unwrap_or(GraphicControl {
        disposal: DisposalMethod::Unspecified,
        delay_cs: 0,
        transparent_index: None,
    });

    let frame = FrameDescriptor {
        data_offset,
        left,
        top,
        width,
        height,
        local_palette,
        disposal: control.disposal,
        transparent_index: control.transparent_index,
        delay_cs: control.delay_cs,
        interlaced: flags & 0x40 != 0,
    };

    match skip_sub_blocks(reader) {
        Ok(()) => Ok((frame, None)),
        Err(e @ DecodeError::TruncatedData { .. }) => Ok((frame, Some(e))),
        Err(e) => Err(e),
    }
}

fn read_sub_block(reader: &mut SourceReader) -> Result<Vec<u8>, DecodeError> {
    let size = usize::from(reader.read_u8()?);
    let mut data = vec![0u8; size];
    reader.fill(&mut data)?;
    Ok(data)
}

fn read_sub_blocks(reader: &mut SourceReader) -> Result<Vec<u8>, DecodeError> {
    let mut collected = Vec::new();
    loop {
        let block = read_sub_block(reader)?;
        if block.is_empty() {
            return Ok(collected);
        }
        collected.extend_from_slice(&block);
    }
}

fn skip_sub_blocks(reader: &mut SourceReader) -> Result<(), DecodeError> {
    loop {
        let size = reader.read_u8()?;
        if size == 0 {
            return Ok(());
        }
        reader.skip(u64::from(size))?;
    }
}
