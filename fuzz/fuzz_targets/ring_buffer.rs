#![no_main]

use std::collections::VecDeque;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logflux_log_pipeline::buffer::RingBuffer;
use logflux_log_pipeline::buffer::ring::FRAME_HEADER_LEN;

#[derive(Arbitrary, Debug)]
enum Op {
    Write(Vec<u8>),
    ReadOne,
    ReadBatch,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    capacity: u16,
    ops: Vec<Op>,
}

fuzz_target!(|input: FuzzInput| {
    let capacity = usize::from(input.capacity).max(FRAME_HEADER_LEN + 1);
    let ring = RingBuffer::new(capacity);
    // 링과 같은 순서를 가져야 하는 기준 모델
    let mut model: VecDeque<Vec<u8>> = VecDeque::new();

    for op in input.ops {
        match op {
            Op::Write(payload) => {
                if ring.write(&payload) {
                    model.push_back(payload);
                }
            }
            Op::ReadOne => {
                let got = ring.read_one().map(|b| b.to_vec());
                assert_eq!(got, model.pop_front());
            }
            Op::ReadBatch => {
                let got: Vec<Vec<u8>> = ring.read_batch().iter().map(|b| b.to_vec()).collect();
                let expected: Vec<Vec<u8>> = model.drain(..).collect();
                assert_eq!(got, expected);
            }
        }
        assert!(ring.len_bytes() <= ring.capacity());
    }
});
