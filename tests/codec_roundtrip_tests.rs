//! Property-based round-trip tests for the value and record codec
//!
//! Every argument type must decode to exactly what was encoded, including empty
//! and absent arrays, null pointers and every opaque sub-variant, and every
//! encoding must stay 4-byte aligned.

use gltrace::codec::{
    decode, decode_record, encode_record, encode_to_vec, ByteReader, CallRecord, CodecContext,
    Opaque, RecordFlags, Scalar, Value, ALIGNMENT,
};
use gltrace::schema::{ArgType, OpaqueRole, SchemaRegistry};
use proptest::prelude::*;

fn ctx() -> CodecContext {
    CodecContext::new(7)
}

fn ty(s: &str) -> ArgType {
    ArgType::parse(s).unwrap()
}

fn round_trip(t: &ArgType, v: &Value, ctx: &CodecContext) -> Result<(), TestCaseError> {
    let bytes = encode_to_vec(t, v, ctx).unwrap();
    prop_assert_eq!(bytes.len() % ALIGNMENT, 0);
    let mut r = ByteReader::new(&bytes);
    let decoded = decode(t, ctx, &mut r).unwrap();
    prop_assert_eq!(&decoded, v);
    prop_assert_eq!(r.remaining(), 0);
    Ok(())
}

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.;(){}=+*/-]{0,48}"
}

fn scalar() -> impl Strategy<Value = (ArgType, Value)> {
    prop_oneof![
        any::<i8>().prop_map(|v| (ty("i8"), Value::Scalar(Scalar::I8(v)))),
        any::<u16>().prop_map(|v| (ty("u16"), Value::Scalar(Scalar::U16(v)))),
        any::<i32>().prop_map(|v| (ty("i32"), Value::Scalar(Scalar::I32(v)))),
        any::<u32>().prop_map(|v| (ty("u32"), Value::Scalar(Scalar::U32(v)))),
        any::<i64>().prop_map(|v| (ty("i64"), Value::Scalar(Scalar::I64(v)))),
        any::<u64>().prop_map(|v| (ty("u64"), Value::Scalar(Scalar::U64(v)))),
        (-1.0e6f32..1.0e6).prop_map(|v| (ty("f32"), Value::Scalar(Scalar::F32(v)))),
        (-1.0e12f64..1.0e12).prop_map(|v| (ty("f64"), Value::Scalar(Scalar::F64(v)))),
        any::<bool>().prop_map(|v| (ty("bool"), Value::Scalar(Scalar::Bool(v)))),
    ]
}

fn opaque(role: OpaqueRole) -> BoxedStrategy<Opaque> {
    let blob = prop::collection::vec(any::<u8>(), 0..64).prop_map(Opaque::Blob);
    let bor = any::<u32>().prop_map(Opaque::BufferObjectReference);
    match role {
        OpaqueRole::Texture => prop_oneof![blob, bor].boxed(),
        OpaqueRole::Readback => prop_oneof![Just(Opaque::NoOp), bor].boxed(),
        OpaqueRole::Generic => prop_oneof![
            blob,
            bor,
            (any::<u32>(), any::<u32>()).prop_map(|(name, offset)| {
                Opaque::ClientSideBufferReference { name, offset }
            }),
        ]
        .boxed(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_scalars_round_trip((t, v) in scalar()) {
        round_trip(&t, &v, &ctx())?;
    }

    #[test]
    fn prop_enums_and_handles_round_trip(
        e in any::<u32>(),
        h in any::<u32>(),
        loc in any::<i32>(),
    ) {
        round_trip(&ty("enum:GLenum"), &Value::Enum(e), &ctx())?;
        round_trip(&ty("handle:texture"), &Value::Handle(h), &ctx())?;
        round_trip(&ty("uniform_location"), &Value::Scoped(loc), &ctx())?;
    }

    #[test]
    fn prop_strings_round_trip(
        s in prop::option::of(text()),
        list in prop::option::of(prop::collection::vec(prop::option::of(text()), 0..6)),
    ) {
        round_trip(&ty("string"), &Value::String(s), &ctx())?;
        round_trip(&ty("string[]"), &Value::StringArray(list), &ctx())?;
    }

    #[test]
    fn prop_arrays_and_blobs_round_trip(
        ints in prop::option::of(prop::collection::vec(any::<i32>(), 0..32)),
        shorts in prop::option::of(prop::collection::vec(any::<u16>(), 0..33)),
        ids in prop::option::of(prop::collection::vec(any::<u32>(), 0..16)),
        blob in prop::option::of(prop::collection::vec(any::<u8>(), 0..257)),
    ) {
        let ints = Value::Array(ints.map(|v| v.into_iter().map(Scalar::I32).collect()));
        let shorts = Value::Array(shorts.map(|v| v.into_iter().map(Scalar::U16).collect()));
        round_trip(&ty("array:i32"), &ints, &ctx())?;
        round_trip(&ty("array:u16"), &shorts, &ctx())?;
        round_trip(&ty("handle[]:buffer"), &Value::HandleArray(ids), &ctx())?;
        round_trip(&ty("blob"), &Value::Blob(blob), &ctx())?;
    }

    #[test]
    fn prop_pointers_round_trip(inner in prop::option::of(any::<i32>())) {
        let v = Value::Pointer(inner.map(|i| Box::new(Value::Scalar(Scalar::I32(i)))));
        round_trip(&ty("ptr:i32"), &v, &ctx())?;
    }

    #[test]
    fn prop_opaques_round_trip(
        texture in opaque(OpaqueRole::Texture),
        readback in opaque(OpaqueRole::Readback),
        generic in opaque(OpaqueRole::Generic),
    ) {
        round_trip(&ty("opaque:texture"), &Value::Opaque(texture), &ctx())?;
        round_trip(&ty("opaque:readback"), &Value::Opaque(readback), &ctx())?;
        round_trip(&ty("opaque:generic"), &Value::Opaque(generic), &ctx())?;
    }

    #[test]
    fn prop_legacy_blobs_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let legacy = CodecContext::new(5);
        round_trip(&ty("opaque:texture"), &Value::Opaque(Opaque::Blob(bytes)), &legacy)?;
    }

    #[test]
    fn prop_records_round_trip(
        tid in any::<u8>(),
        err_no in 0u8..16,
        injected in any::<bool>(),
        name in prop::option::of(text()),
        location in -1i32..64,
    ) {
        let registry = SchemaRegistry::default_gles().unwrap();
        let sig = registry.lookup("glGetUniformLocation").unwrap();
        let args = vec![Value::Handle(3), Value::String(name)];
        let mut record = CallRecord::new(sig.id, tid, args, Value::Scoped(location));
        record.flags = RecordFlags { err_no, injected, side_effect: false };

        let bytes = encode_record(sig, &record, &ctx()).unwrap();
        let (decoded, len) = decode_record(&bytes, |id| registry.by_id(id), &ctx()).unwrap();
        prop_assert_eq!(len, bytes.len());
        prop_assert_eq!(decoded, record);
    }
}

#[test]
fn test_buffer_reference_is_not_a_blob() {
    // a bound-buffer offset must come back as an offset
    let t = ty("opaque:texture");
    let offset = Value::Opaque(Opaque::BufferObjectReference(4096));
    let bytes = encode_to_vec(&t, &offset, &ctx()).unwrap();
    let decoded = decode(&t, &ctx(), &mut ByteReader::new(&bytes)).unwrap();
    assert_eq!(decoded, Value::Opaque(Opaque::BufferObjectReference(4096)));
}

#[test]
fn test_legacy_trace_rejects_buffer_references() {
    let t = ty("opaque:texture");
    let legacy = CodecContext::new(5);
    assert!(encode_to_vec(&t, &Value::Opaque(Opaque::BufferObjectReference(16)), &legacy).is_err());
}
