#![no_main]
use libfuzzer_sys::fuzz_target;
use remapvec::{GrowthPolicy, Vector};

fuzz_target!(|data: &[u8]| {
    // Each 4-byte chunk is one operation: opcode, two argument bytes, value.
    let policy = GrowthPolicy::default().with_remap_search(data.first() == Some(&0xFF));
    let mut v: Vector<u16> = Vector::with_policy(policy);
    let mut model: Vec<u16> = Vec::new();

    for chunk in data.chunks_exact(4) {
        let arg = usize::from(u16::from_le_bytes([chunk[1], chunk[2]]));
        let value = u16::from(chunk[3]);
        match chunk[0] % 9 {
            0 => {
                v.push(value);
                model.push(value);
            }
            1 => assert_eq!(v.pop(), model.pop()),
            2 => {
                let at = arg % (model.len() + 1);
                let n = arg % 512;
                v.insert_n(at, n, &value);
                let tail = model.split_off(at);
                model.extend(std::iter::repeat_n(value, n));
                model.extend(tail);
            }
            3 if !model.is_empty() => {
                let at = arg % model.len();
                assert_eq!(v.remove(at), model.remove(at));
            }
            4 => {
                let end = arg % (model.len() + 1);
                let start = usize::from(chunk[3]) % (end + 1);
                v.remove_range(start..end);
                model.drain(start..end).for_each(drop);
            }
            5 => v.reserve(arg * 16),
            6 => v.shrink_to_fit(),
            7 => {
                v.resize(arg, value);
                model.resize(arg, value);
            }
            _ => {
                let items: Vec<u16> = (0..arg % 64).map(|i| i as u16 ^ value).collect();
                v.assign_slice(&items);
                model = items;
            }
        }
        assert!(v.capacity() >= v.len());
        assert_eq!(&v[..], &model[..]);
    }
});
