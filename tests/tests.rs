use rnc::{
    Crc16, Decoder, EncoderBuilder, LzssBackend, LzssSettings, RncDecoder, RncError, RncMethod,
    HEADER_LEN, NOT_PACKED, PACKED_CRC, UNPACKED_CRC,
};
use std::borrow::Cow;
use std::io::Cursor;
use std::str::from_utf8;

const LOREM: &str = include_str!("lorem.txt");

/// Hand assemble an RNC file around `payload`
fn rnc_file(method: RncMethod, unpacked: &[u8], blocks: u8, payload: &[u8]) -> Vec<u8> {
    let crc = Crc16::new();
    let mut bytes = method.signature().to_be_bytes().to_vec();
    bytes.extend_from_slice(&(unpacked.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&crc.checksum(unpacked).to_be_bytes());
    bytes.extend_from_slice(&crc.checksum(payload).to_be_bytes());
    bytes.extend_from_slice(&[0, blocks]);
    bytes.extend_from_slice(payload);
    bytes
}

fn test_file() -> Vec<u8> {
    let payload = [
        0x10, 0x00, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x54, 0x45, 0x53, 0x54,
    ];
    rnc_file(RncMethod::M1, b"TEST", 1, &payload)
}

fn m2_test_file() -> Vec<u8> {
    // 'a', then ten bytes from one back, then the end marker
    let payload = [0x1E, 0x61, 0x02, 0x00, 0xF0, 0x00];
    rnc_file(RncMethod::M2, &[b'a'; 11], 1, &payload)
}

/// Deterministic bytes that no LZSS parse can shrink
fn noise(len: usize) -> Vec<u8> {
    let mut x = 0x2545_F491u32;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

fn pack(input: &[u8], method: RncMethod, backend: LzssBackend) -> Vec<u8> {
    EncoderBuilder::for_bytes(input)
        .method(method)
        .lzss_backend(backend)
        .encode_to_vec()
        .unwrap()
}

#[test]
fn decode_literal_only_file() {
    let packed = test_file();
    let mut output = [0u8; 4];

    let rnc = RncDecoder::new();
    assert_eq!(rnc.unpack_m1(&packed, &mut output).unwrap(), 4);
    assert_eq!(&output, b"TEST");

    let decoded = rnc::decode(Cursor::new(&packed)).unwrap();
    assert_eq!(from_utf8(&decoded).unwrap(), "TEST");
}

#[test]
fn decode_self_referencing_copies() {
    let expected = [b'a'; 11];
    let rnc = RncDecoder::new();

    let m1 = rnc_file(
        RncMethod::M1,
        &expected,
        1,
        &[0x88, 0x88, 0x10, 0x05, 0x00, 0x20, 0x04, 0x00, 0x02, 0x00, 0x61],
    );
    let mut output = [0u8; 11];
    assert_eq!(rnc.unpack_m1(&m1, &mut output).unwrap(), 11);
    assert_eq!(output, expected);

    let m2 = rnc_file(
        RncMethod::M2,
        &expected,
        1,
        &[0x1E, 0x61, 0x02, 0x00, 0xF0, 0x00],
    );
    let mut output = [0u8; 11];
    assert_eq!(rnc.unpack_m2(&m2, &mut output).unwrap(), 11);
    assert_eq!(output, expected);
}

#[test]
fn literal_run_past_input_aborts() {
    let payload = [
        0x14, 0x00, 0x80, 0x00, 0x20, 0x00, 0x00, 0x00, 0x54, 0x45, 0x53, 0x54,
    ];
    let packed = rnc_file(RncMethod::M1, b"TESTTEST", 1, &payload);
    let mut output = [0u8; 8];

    let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
    assert_eq!(err.code(), NOT_PACKED);
}

#[test]
fn reject_data_without_signature() {
    let rnc = RncDecoder::new();
    let mut output = [0u8; 32];

    for bad in &[&b"RNX\x01TEST"[..], b"", b"PK\x03\x04 and then some more bytes"] {
        let err = rnc.unpack(bad, &mut output).unwrap_err();
        assert!(matches!(err, RncError::NotPacked));
        assert_eq!(err.code(), NOT_PACKED);
    }

    let plain = b"just some plain text";
    assert!(matches!(rnc::decode_or_raw(plain).unwrap(), Cow::Borrowed(_)));
}

#[test]
fn packed_crc_failure_leaves_output_untouched() {
    let mut packed = test_file();
    // flip a bit in a literal
    packed[HEADER_LEN + 9] ^= 0x01;
    let mut output = [0xAAu8; 4];

    let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
    assert_eq!(err.code(), PACKED_CRC);
    assert_eq!(output, [0xAA; 4]);
}

#[test]
fn unpacked_crc_failure() {
    let mut packed = test_file();
    // header bytes 12..14 hold the unpacked crc
    packed[12] ^= 0xFF;
    let mut output = [0u8; 4];

    let err = RncDecoder::new().unpack_m1(&packed, &mut output).unwrap_err();
    assert!(matches!(err, RncError::UnpackedCrc { found: 0xEA3C, .. }));
    assert_eq!(err.code(), UNPACKED_CRC);
}

#[test]
fn m2_packed_crc_failure_leaves_output_untouched() {
    let mut packed = m2_test_file();
    // the literal 'a'
    packed[HEADER_LEN + 1] ^= 0x01;
    let mut output = [0xAAu8; 11];

    let err = RncDecoder::new().unpack_m2(&packed, &mut output).unwrap_err();
    assert_eq!(err.code(), PACKED_CRC);
    assert_eq!(output, [0xAA; 11]);
}

#[test]
fn m2_unpacked_crc_failure() {
    let mut packed = m2_test_file();
    let mut output = [0u8; 11];
    assert_eq!(RncDecoder::new().unpack_m2(&packed, &mut output).unwrap(), 11);

    packed[12] ^= 0xFF;
    let err = RncDecoder::new().unpack_m2(&packed, &mut output).unwrap_err();
    assert!(matches!(err, RncError::UnpackedCrc { .. }));
    assert_eq!(err.code(), UNPACKED_CRC);
}

#[test]
fn decode_packed_fixtures() {
    let mixed = include_bytes!("mixed.bin");
    let fixtures: [(&[u8], RncMethod, &[u8], u8); 4] = [
        (include_bytes!("lorem.rnc1"), RncMethod::M1, LOREM.as_bytes(), 1),
        (include_bytes!("lorem.rnc2"), RncMethod::M2, LOREM.as_bytes(), 1),
        (include_bytes!("mixed.rnc1"), RncMethod::M1, mixed, 14),
        (include_bytes!("mixed.rnc2"), RncMethod::M2, mixed, 1),
    ];
    let rnc = RncDecoder::new();

    for (packed, method, expected, blocks) in fixtures.iter() {
        let header = rnc::rnc_info(&packed[..]).unwrap();
        assert_eq!(header.method, *method);
        assert_eq!(header.blocks, *blocks);
        assert_eq!(header.unpacked_len as usize, expected.len());

        let mut output = vec![0; expected.len()];
        assert_eq!(rnc.unpack(packed, &mut output).unwrap(), expected.len());
        assert_eq!(&output[..], *expected, "{}", method);
        assert_eq!(&rnc::decode(&packed[..]).unwrap()[..], *expected);
    }
}

#[test]
fn in_place_after_incompressible_data() {
    let mut input = vec![0; 20_000];
    input.extend(noise(20_000));

    let packed = EncoderBuilder::for_bytes(&input).encode_to_vec().unwrap();
    let header = rnc::rnc_info(&packed[..]).unwrap();
    assert!(header.packed_len as usize <= input.len());

    let mut buf = vec![0; header.required_output_len().max(packed.len())];
    buf[..packed.len()].copy_from_slice(&packed);
    assert_eq!(
        RncDecoder::new().unpack_m1_in_place(&mut buf).unwrap(),
        input.len()
    );
    assert_eq!(&buf[..input.len()], &input[..]);
}

#[test]
fn too_much_leeway_is_an_error() {
    // method 2 cannot store noise this long in fewer bytes than it unpacks to
    let mut input = vec![0; 20_000];
    input.extend(noise(40_000));

    let err = EncoderBuilder::for_bytes(&input)
        .m2()
        .encode_to_vec()
        .unwrap_err();
    assert!(matches!(err, RncError::Leeway(n) if n > 255));
    assert_eq!(err.code(), NOT_PACKED);
}

#[test]
fn round_trip_lorem() {
    let backends = [LzssBackend::Brute, LzssBackend::HashChain];
    let methods = [RncMethod::M1, RncMethod::M2];

    for &method in &methods {
        for &backend in &backends {
            let packed = pack(LOREM.as_bytes(), method, backend);
            assert!(packed.len() < LOREM.len(), "{} {:?}", method, backend);

            let header = rnc::rnc_info(&packed[..]).unwrap();
            assert_eq!(header.method, method);
            assert_eq!(header.unpacked_len as usize, LOREM.len());
            assert_eq!(header.packed_len as usize + HEADER_LEN, packed.len());

            let decoded = Decoder::for_bytes(&packed).decode().unwrap();
            assert_eq!(from_utf8(&decoded).unwrap(), LOREM, "{} {:?}", method, backend);
        }
    }
}

#[test]
fn round_trip_small_inputs() {
    let inputs: &[&[u8]] = &[b"", b"a", b"ab", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", b"ABBACABBACD"];
    let rnc = RncDecoder::new();

    for &input in inputs {
        for &method in &[RncMethod::M1, RncMethod::M2] {
            let packed = pack(input, method, LzssBackend::Brute);
            let mut output = vec![0; input.len()];
            assert_eq!(rnc.unpack(&packed, &mut output).unwrap(), input.len());
            assert_eq!(output, input);
        }
    }
}

#[test]
fn round_trip_long_matches_and_far_offsets() {
    // a repeated block further back than method 2's short offsets reach
    let mut input: Vec<u8> = (0..3000u32).map(|i| (i * 7 + i / 13) as u8).collect();
    let copy = input[100..1100].to_vec();
    input.extend_from_slice(&copy);
    input.extend(std::iter::repeat(b'z').take(600));

    for &method in &[RncMethod::M1, RncMethod::M2] {
        let packed = pack(&input, method, LzssBackend::HashChain);
        assert_eq!(rnc::decode(&packed[..]).unwrap(), input, "{}", method);
    }
}

#[test]
fn in_place_matches_separate_buffers() {
    let packed = pack(LOREM.as_bytes(), RncMethod::M1, LzssBackend::HashChain);
    let header = rnc::rnc_info(&packed[..]).unwrap();

    let mut expected = vec![0; LOREM.len()];
    let rnc = RncDecoder::new();
    rnc.unpack_m1(&packed, &mut expected).unwrap();

    let mut buf = vec![0; header.required_output_len().max(packed.len())];
    buf[..packed.len()].copy_from_slice(&packed);
    assert_eq!(rnc.unpack_m1_in_place(&mut buf).unwrap(), LOREM.len());
    assert_eq!(&buf[..LOREM.len()], &expected[..]);
}

#[test]
fn unpack_within_one_buffer() {
    let packed = pack(LOREM.as_bytes(), RncMethod::M1, LzssBackend::HashChain);
    let rnc = RncDecoder::new();

    // packed data well past the end of the output
    let mut buf = vec![0; LOREM.len() + 4096];
    let input_offset = LOREM.len() + 100;
    buf[input_offset..input_offset + packed.len()].copy_from_slice(&packed);
    assert_eq!(rnc.unpack_m1_within(&mut buf, input_offset, 0).unwrap(), LOREM.len());
    assert_eq!(&buf[..LOREM.len()], LOREM.as_bytes());

    // packed data in the middle of the output region
    let header = rnc::rnc_info(&packed[..]).unwrap();
    let mut buf = vec![0; 64 + header.required_output_len()];
    buf[100..100 + packed.len()].copy_from_slice(&packed);
    assert_eq!(rnc.unpack_m1_within(&mut buf, 100, 64).unwrap(), LOREM.len());
    assert_eq!(&buf[64..64 + LOREM.len()], LOREM.as_bytes());

    // the output region does not fit in the buffer
    let mut buf = packed.clone();
    let err = rnc.unpack_m1_in_place(&mut buf).unwrap_err();
    assert!(matches!(err, RncError::OutputTooSmall { .. }));
}

#[test]
fn long_literal_runs_span_blocks() {
    let input: Vec<u8> = (0..70_000u32).map(|i| (i * 7 + i / 3) as u8).collect();
    // no match can be this long, so everything is a literal
    let packed = EncoderBuilder::for_bytes(&input)
        .with_lzss_settings(LzssSettings::new(4096, 255, 1000))
        .encode_to_vec()
        .unwrap();

    let header = rnc::rnc_info(&packed[..]).unwrap();
    assert_eq!(header.blocks, 3);
    assert_eq!(rnc::decode(&packed[..]).unwrap(), input);
}

#[test]
fn logging_describes_the_stream() {
    let mut enc_log = Vec::new();
    let packed = EncoderBuilder::for_bytes(LOREM.as_bytes())
        .with_logging(&mut enc_log)
        .encode_to_vec()
        .unwrap();
    let enc_log = String::from_utf8(enc_log).unwrap();
    assert!(enc_log.contains("# LZSS Parse"));
    assert!(enc_log.contains("## Literal Run Table"));

    let mut dec_log = Vec::new();
    let decoded = Decoder::for_bytes(&packed)
        .with_logging(&mut dec_log)
        .decode()
        .unwrap();
    assert_eq!(decoded, LOREM.as_bytes());

    let dec_log = String::from_utf8(dec_log).unwrap();
    assert!(dec_log.contains("# Header"));
    assert!(dec_log.contains("# Block 0"));
    assert!(dec_log.contains("Match: length"));
}

#[test]
fn file_round_trip() {
    let path = std::env::temp_dir().join(format!("rnc-lorem-{}.rnc", std::process::id()));
    EncoderBuilder::for_bytes(LOREM.as_bytes())
        .m2()
        .encode_to_file(&path)
        .unwrap();

    let mut decoder = Decoder::for_file(&path).unwrap();
    assert_eq!(decoder.header().unwrap().method, RncMethod::M2);
    let decoded = decoder.decode().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(from_utf8(&decoded).unwrap(), LOREM);
}
