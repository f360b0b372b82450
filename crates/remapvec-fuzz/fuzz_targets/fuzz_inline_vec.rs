#![no_main]
use libfuzzer_sys::fuzz_target;
use remapvec::InlineVec;

fuzz_target!(|data: &[u8]| {
    let mut v: InlineVec<u8, 16> = InlineVec::new();
    let mut model: Vec<u8> = Vec::new();

    for pair in data.chunks_exact(2) {
        let (op, value) = (pair[0], pair[1]);
        match op % 4 {
            0 => {
                let pushed = v.try_push(value).is_ok();
                assert_eq!(pushed, model.len() < 16);
                if pushed {
                    model.push(value);
                }
            }
            1 => assert_eq!(v.pop(), model.pop()),
            2 => {
                let at = usize::from(value) % (model.len() + 1);
                if v.try_insert(at, value).is_ok() {
                    model.insert(at, value);
                }
            }
            _ if !model.is_empty() => {
                let at = usize::from(value) % model.len();
                assert_eq!(v.swap_remove(at), model.swap_remove(at));
            }
            _ => {}
        }
        // Rejected operations must leave the contents untouched.
        assert_eq!(&v[..], &model[..]);
    }
});
