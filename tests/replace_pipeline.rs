//! 帧替换端到端测试: 组装 -> 解码 -> 差异 -> 重编码 -> 写回 -> 重新解码.

use std::sync::Arc;

use psxmdec::codec::{
    BitstreamCompressor, BitstreamDecoder, DEFAULT_PROBE_ORDER, DecoderKind, FrameEncoder,
    PsxYCbCrImage, StrVariant,
};
use psxmdec::core::MdecError;
use psxmdec::sector::{
    AssemblerConfig, ChannelDispatcher, ChunkHeader, FinishedChunkSet, FrameChunk, MemoryChunk,
};
use psxmdec::{
    FrameReplacer, MdecConfig, MemoryPatchSink, PatchSink, PixelRect, ReplaceConfig, ReplaceJob,
    ReplaceMode, replacer_from_config, split_for_sectors, verify_variant,
};

fn noisy_rgb(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..width * height * 3)
        .map(|i| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((state >> 16) as u8 / 2).wrapping_add((i % 89) as u8)
        })
        .collect()
}

fn compress_rgb(width: u32, height: u32, rgb: &[u8], qscale: u8, variant: StrVariant) -> Vec<u8> {
    let image = PsxYCbCrImage::from_rgb(width, height, rgb).unwrap();
    BitstreamCompressor::new(variant)
        .compress(&FrameEncoder::full(&image).codes(qscale), width, height)
        .unwrap()
}

fn chunks_for(data: &[u8], pieces: u16, frame_number: u32, width: u32, height: u32) -> Vec<Arc<dyn FrameChunk>> {
    let size = data.len().div_ceil(pieces as usize);
    data.chunks(size)
        .enumerate()
        .map(|(i, piece)| {
            let header = ChunkHeader {
                chunk_index: i as u16,
                chunk_count: pieces,
                frame_number,
                channel: 0,
                width,
                height,
            };
            let sector = frame_number * 16 + i as u32;
            Arc::new(MemoryChunk::new(header, sector, piece.to_vec())) as Arc<dyn FrameChunk>
        })
        .collect()
}

/// 把码流切块后经分发器组装成一帧
fn assemble(data: &[u8], pieces: u16, frame_number: u32, width: u32, height: u32) -> FinishedChunkSet {
    let mut dispatcher = ChannelDispatcher::new(AssemblerConfig::default());
    let mut frames = Vec::new();
    for chunk in chunks_for(data, pieces, frame_number, width, height) {
        frames.extend(dispatcher.feed(chunk).unwrap());
    }
    frames.extend(dispatcher.flush());
    assert_eq!(frames.len(), 1);
    frames.remove(0)
}

fn decode_bytes(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let stream = BitstreamDecoder::new().decode(data, width, height).unwrap();
    let mut transform = DecoderKind::Fixed.create();
    transform.decode(&stream).unwrap();
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    transform.read_pixels(&mut rgb).unwrap();
    rgb
}

fn fill_rect(rgb: &mut [u8], width: u32, rect: PixelRect, color: [u8; 3]) {
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            let off = (y * width + x) as usize * 3;
            rgb[off..off + 3].copy_from_slice(&color);
        }
    }
}

fn full_config() -> ReplaceConfig {
    ReplaceConfig {
        mode: ReplaceMode::Full,
        ..Default::default()
    }
}

#[test]
fn test_full_replacement_fits_and_decodes() {
    let (width, height) = (48, 32);
    let original = compress_rgb(width, height, &noisy_rgb(width, height, 5), 2, StrVariant::V2);
    let frame = assemble(&original, 3, 1, width, height);

    let grey = vec![128u8; (width * height * 3) as usize];
    let mut sink = MemoryPatchSink::new();
    let outcome = FrameReplacer::new(full_config())
        .replace(&ReplaceJob::new(frame.clone(), grey), &mut sink)
        .unwrap();

    assert_eq!(outcome.frame_number, 1);
    assert_eq!(outcome.variant, StrVariant::V2);
    assert_eq!(outcome.budget, original.len());
    assert!(outcome.data_len <= outcome.budget);
    assert_eq!(outcome.reencoded_macroblocks, 6);
    assert_eq!(outcome.qscale, 1, "平坦图像在最小 qscale 即可放下");

    let patched = sink.frame_bytes(1).unwrap();
    assert_eq!(patched.len(), frame.byte_len(), "写回内容按原始块长度补齐");
    let sectors: Vec<u32> = sink.patches()[0].1.iter().map(|p| p.sector).collect();
    assert_eq!(sectors, frame.sectors());

    for value in decode_bytes(&patched, width, height) {
        assert!(value.abs_diff(128) <= 2, "解码结果应接近灰色: {}", value);
    }
}

#[test]
fn test_partial_replacement_touches_only_changed_macroblock() {
    let (width, height) = (48, 32);
    let original = compress_rgb(width, height, &noisy_rgb(width, height, 8), 2, StrVariant::V2);
    let frame = assemble(&original, 2, 4, width, height);
    let before = decode_bytes(&original, width, height);

    let painted = PixelRect::new(16, 16, 16, 16);
    let color = [160, 120, 90];
    let mut replacement = before.clone();
    fill_rect(&mut replacement, width, painted, color);

    let mut sink = MemoryPatchSink::new();
    let outcome = FrameReplacer::new(ReplaceConfig::default())
        .replace(&ReplaceJob::new(frame, replacement), &mut sink)
        .unwrap();
    assert_eq!(outcome.reencoded_macroblocks, 1);
    assert_eq!(outcome.qscale, 2, "原 qscale 下即可放下");
    assert!(outcome.data_len <= original.len());

    let after = decode_bytes(&sink.frame_bytes(4).unwrap(), width, height);
    for y in 0..height {
        for x in 0..width {
            let off = (y * width + x) as usize * 3;
            if painted.contains(x, y) {
                for c in 0..3 {
                    assert!(
                        after[off + c].abs_diff(color[c]) <= 6,
                        "({}, {}) 通道 {}: {} vs {}",
                        x,
                        y,
                        c,
                        after[off + c],
                        color[c]
                    );
                }
            } else {
                assert_eq!(after[off..off + 3], before[off..off + 3], "未改动的宏块应保持不变");
            }
        }
    }
}

#[test]
fn test_partial_without_differences_is_byte_identical() {
    let (width, height) = (32, 32);
    let original = compress_rgb(width, height, &noisy_rgb(width, height, 21), 7, StrVariant::V2);
    let frame = assemble(&original, 3, 2, width, height);
    let decoded = decode_bytes(&original, width, height);

    let prepared = FrameReplacer::new(ReplaceConfig::default())
        .prepare(&ReplaceJob::new(frame, decoded))
        .unwrap();
    assert_eq!(prepared.outcome.reencoded_macroblocks, 0);
    assert_eq!(prepared.outcome.qscale, 7);
    assert_eq!(prepared.data, original, "无差异时输出应与原始码流逐字节一致");
}

#[test]
fn test_changes_outside_rect_are_ignored() {
    let (width, height) = (32, 16);
    let original = compress_rgb(width, height, &noisy_rgb(width, height, 3), 4, StrVariant::V2);
    let frame = assemble(&original, 1, 6, width, height);
    let mut replacement = decode_bytes(&original, width, height);
    fill_rect(&mut replacement, width, PixelRect::new(20, 0, 4, 4), [0, 0, 0]);

    let job = ReplaceJob::new(frame, replacement).with_rect(PixelRect::new(0, 0, 16, 16));
    let prepared = FrameReplacer::new(ReplaceConfig::default())
        .prepare(&job)
        .unwrap();
    assert_eq!(prepared.outcome.reencoded_macroblocks, 0);
    assert_eq!(prepared.data, original);
}

#[test]
fn test_replacement_that_cannot_fit() {
    let (width, height) = (32, 32);
    let flat = vec![90u8; (width * height * 3) as usize];
    let original = compress_rgb(width, height, &flat, 63, StrVariant::V2);
    let frame = assemble(&original, 1, 3, width, height);

    // 单像素棋盘格: 最高频系数在 qscale 63 下仍非零
    let checker: Vec<u8> = (0..width * height)
        .flat_map(|i| {
            let (x, y) = (i % width, i / width);
            let v = if (x + y) % 2 == 0 { 0 } else { 255 };
            [v, v, v]
        })
        .collect();

    let err = FrameReplacer::new(full_config())
        .prepare(&ReplaceJob::new(frame, checker))
        .unwrap_err();
    match err {
        MdecError::CompressDoesNotFit { budget, smallest } => {
            assert_eq!(budget, original.len());
            assert!(smallest.is_some_and(|s| s > budget));
        }
        other => panic!("意外的错误: {:?}", other),
    }
}

#[test]
fn test_batch_isolates_failing_frame() {
    let (width, height) = (32, 16);
    let good_a = compress_rgb(width, height, &noisy_rgb(width, height, 1), 3, StrVariant::V2);
    let good_b = compress_rgb(width, height, &noisy_rgb(width, height, 2), 3, StrVariant::V2);
    let gapped = compress_rgb(width, height, &noisy_rgb(width, height, 4), 3, StrVariant::V2);

    let frame_a = assemble(&good_a, 2, 10, width, height);
    let frame_c = assemble(&good_b, 2, 12, width, height);
    let mut dispatcher = ChannelDispatcher::new(AssemblerConfig::default());
    let gapped_chunks = chunks_for(&gapped, 3, 11, width, height);
    dispatcher.feed(Arc::clone(&gapped_chunks[0])).unwrap();
    dispatcher.feed(Arc::clone(&gapped_chunks[2])).unwrap();
    let frame_b = dispatcher.flush().remove(0);

    let grey = vec![100u8; (width * height * 3) as usize];
    let jobs = vec![
        ReplaceJob::new(frame_a, grey.clone()),
        ReplaceJob::new(frame_b, grey.clone()),
        ReplaceJob::new(frame_c, grey),
    ];
    let mut sink = MemoryPatchSink::new();
    let results = FrameReplacer::new(full_config()).replace_batch(&jobs, &mut sink);

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(MdecError::InvalidArgument(_))), "缺块帧应失败");
    assert!(results[2].is_ok());

    let written: Vec<u32> = sink.patches().iter().map(|(n, _)| *n).collect();
    assert_eq!(written, vec![10, 12], "按输入顺序写回成功的帧");
    assert!(sink.frame_bytes(11).is_none());
}

#[test]
fn test_variant_is_preserved_and_checked() {
    let (width, height) = (16, 32);
    let rgb = noisy_rgb(width, height, 17);
    let v1 = compress_rgb(width, height, &rgb, 5, StrVariant::V1);
    let frame = assemble(&v1, 2, 30, width, height);

    let prepared = FrameReplacer::new(full_config())
        .prepare(&ReplaceJob::new(frame, vec![60u8; (width * height * 3) as usize]))
        .unwrap();
    assert_eq!(prepared.outcome.variant, StrVariant::V1, "替换结果沿用原始格式变体");
    assert!(verify_variant(&prepared.data, StrVariant::V1, DEFAULT_PROBE_ORDER, width, height).is_ok());

    let v2 = compress_rgb(width, height, &rgb, 5, StrVariant::V2);
    let err = verify_variant(&v2, StrVariant::V1, DEFAULT_PROBE_ORDER, width, height).unwrap_err();
    assert!(matches!(err, MdecError::VariantMismatch { .. }));
}

#[test]
fn test_sink_rejects_oversized_data() {
    let (width, height) = (16, 16);
    let original = compress_rgb(width, height, &noisy_rgb(width, height, 2), 9, StrVariant::V2);
    let frame = assemble(&original, 2, 40, width, height);

    let too_long = vec![0u8; frame.byte_len() + 1];
    assert!(matches!(
        split_for_sectors(&frame, &too_long),
        Err(MdecError::Sink(_))
    ));
    let mut sink = MemoryPatchSink::new();
    assert!(sink.patch(&frame, &too_long).is_err());
    assert!(sink.patches().is_empty());

    let pieces = split_for_sectors(&frame, &original[..4]).unwrap();
    assert_eq!(pieces.len(), 2);
    assert_eq!(&pieces[0].data[..4], &original[..4]);
    assert!(pieces[0].data[4..].iter().all(|&b| b == 0));
    assert!(pieces[1].data.iter().all(|&b| b == 0));
}

#[test]
fn test_replacer_from_json_config() {
    let config = MdecConfig::from_json_str(r#"{"replace":{"mode":"full","decoder":"float"}}"#).unwrap();
    let replacer = replacer_from_config(&config);
    assert_eq!(replacer.config().mode, ReplaceMode::Full);
    assert_eq!(replacer.config().decoder, DecoderKind::Float);
}
