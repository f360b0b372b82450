//! Integration test: `Vector` against a `std::vec::Vec` model.
//!
//! Deterministic xorshift sequences drive both containers through the same
//! operations and compare contents after every step; proptest then checks
//! value preservation across arbitrary operation lists.
//!
//! Run: cargo test -p remapvec --test vector_model_test

use proptest::prelude::*;

use remapvec::{Backend, ElementWise, GrowthPolicy, Relocate, Relocation, RemapOrder, Vector};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Label(String);

// SAFETY: a full bitwise move into dst.
unsafe impl Relocate for Label {
    unsafe fn relocate(src: *mut Self, dst: *mut Self) {
        // SAFETY: caller contract.
        unsafe { dst.write(src.read()) };
    }
}

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Pop,
    Insert(usize, u32),
    InsertSlice(usize, Vec<u32>),
    Remove(usize),
    SwapRemove(usize),
    RemoveRange(usize, usize),
    Truncate(usize),
    Resize(usize, u32),
    Extend(Vec<u32>),
    Assign(Vec<u32>),
    Reserve(usize),
    ShrinkToFit,
}

fn random_op(rng: &mut XorShift64, len: usize, counter: &mut u32) -> Op {
    let mut next = || {
        *counter += 1;
        *counter
    };
    match rng.gen_range_usize(0, 12) {
        0..=2 => Op::Push(next()),
        3 => Op::Pop,
        4 => Op::Insert(rng.gen_range_usize(0, len), next()),
        5 => {
            let n = rng.gen_range_usize(0, 600);
            Op::InsertSlice(rng.gen_range_usize(0, len), (0..n).map(|_| next()).collect())
        }
        6 if len > 0 => Op::Remove(rng.gen_range_usize(0, len - 1)),
        7 if len > 0 => Op::SwapRemove(rng.gen_range_usize(0, len - 1)),
        8 => {
            let a = rng.gen_range_usize(0, len);
            let b = rng.gen_range_usize(0, len);
            Op::RemoveRange(a.min(b), a.max(b))
        }
        9 => Op::Truncate(rng.gen_range_usize(0, len + 10)),
        10 => Op::Resize(rng.gen_range_usize(0, len + 2000), next()),
        11 => {
            let n = rng.gen_range_usize(0, 1500);
            Op::Extend((0..n).map(|_| next()).collect())
        }
        _ => match rng.gen_range_usize(0, 2) {
            0 => Op::Assign((0..rng.gen_range_usize(0, 50)).map(|_| next()).collect()),
            1 => Op::Reserve(rng.gen_range_usize(0, 50_000)),
            _ => Op::ShrinkToFit,
        },
    }
}

fn apply<T, R, F>(v: &mut Vector<T, R>, model: &mut Vec<T>, op: &Op, make: &F)
where
    T: Clone + PartialEq + std::fmt::Debug,
    R: Relocation<T>,
    F: Fn(u32) -> T,
{
    match op {
        Op::Push(x) => {
            v.push(make(*x));
            model.push(make(*x));
        }
        Op::Pop => assert_eq!(v.pop(), model.pop()),
        Op::Insert(at, x) => {
            v.insert(*at, make(*x));
            model.insert(*at, make(*x));
        }
        Op::InsertSlice(at, xs) => {
            let items: Vec<T> = xs.iter().map(|x| make(*x)).collect();
            v.insert_slice(*at, &items);
            let tail = model.split_off(*at);
            model.extend(items);
            model.extend(tail);
        }
        Op::Remove(at) => assert_eq!(v.remove(*at), model.remove(*at)),
        Op::SwapRemove(at) => assert_eq!(v.swap_remove(*at), model.swap_remove(*at)),
        Op::RemoveRange(a, b) => {
            v.remove_range(*a..*b);
            model.drain(*a..*b).for_each(drop);
        }
        Op::Truncate(n) => {
            v.truncate(*n);
            model.truncate(*n);
        }
        Op::Resize(n, x) => {
            v.resize(*n, make(*x));
            model.resize(*n, make(*x));
        }
        Op::Extend(xs) => {
            let items: Vec<T> = xs.iter().map(|x| make(*x)).collect();
            v.extend_from_slice(&items);
            model.extend(items);
        }
        Op::Assign(xs) => {
            let items: Vec<T> = xs.iter().map(|x| make(*x)).collect();
            v.assign_slice(&items);
            *model = items;
        }
        Op::Reserve(n) => {
            v.reserve(*n);
            assert!(v.capacity() >= v.len() + n);
        }
        Op::ShrinkToFit => {
            v.shrink_to_fit();
            assert!(v.capacity() >= v.len());
        }
    }
}

fn run<T, R, F>(policy: GrowthPolicy, seed: u64, steps: usize, make: F)
where
    T: Clone + PartialEq + std::fmt::Debug,
    R: Relocation<T>,
    F: Fn(u32) -> T,
{
    let mut rng = XorShift64::new(seed);
    let mut v: Vector<T, R> = Vector::with_policy(policy);
    let mut model: Vec<T> = Vec::new();
    let mut counter = 0u32;
    for step in 0..steps {
        let op = random_op(&mut rng, model.len(), &mut counter);
        apply(&mut v, &mut model, &op, &make);
        assert_eq!(v.len(), model.len(), "seed={seed} step={step} op={op:?}");
        assert!(v.capacity() >= v.len(), "seed={seed} step={step}");
        assert!(v[..] == model[..], "seed={seed} step={step} op={op:?}");
    }
}

#[test]
fn integer_sequences_match_std_vec() {
    for seed in [1, 2, 3, 4, 5] {
        run::<u32, remapvec::Bitwise, _>(GrowthPolicy::default(), seed, 400, |x| x);
    }
}

#[test]
fn integer_sequences_match_std_vec_with_remap_variants() {
    let search = GrowthPolicy::default().with_remap_search(true);
    let may_move = GrowthPolicy::default().with_remap_order(RemapOrder::MayMoveFirst);
    let heap = GrowthPolicy::default()
        .with_backend(Backend::HeapOnly)
        .with_growth(3, 2)
        .expect("3/2 grows");
    for seed in [7, 8] {
        run::<u64, remapvec::Bitwise, _>(search, seed, 300, u64::from);
        run::<u64, remapvec::Bitwise, _>(may_move, seed, 300, u64::from);
        run::<u64, remapvec::Bitwise, _>(heap, seed, 300, u64::from);
    }
}

#[test]
fn string_sequences_match_std_vec() {
    for seed in [11, 12] {
        run::<String, remapvec::Bitwise, _>(GrowthPolicy::default(), seed, 250, |x| {
            format!("s{x}")
        });
    }
}

#[test]
fn element_wise_sequences_match_std_vec() {
    let policy = GrowthPolicy::default().with_nontrivial_big_threshold(0);
    for seed in [21, 22] {
        run::<Label, ElementWise, _>(policy, seed, 250, |x| Label(format!("l{x}")));
    }
}

fn op_strategy() -> impl Strategy<Value = (u8, usize, u32)> {
    (0u8..6, 0usize..4096, any::<u32>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn values_survive_arbitrary_growth(
        seed in proptest::collection::vec(any::<u32>(), 0..2000),
        ops in proptest::collection::vec(op_strategy(), 0..40),
    ) {
        let mut v: Vector<u32> = Vector::with_policy(GrowthPolicy::default());
        v.extend_from_copy_slice(&seed);
        let mut model = seed.clone();
        for (kind, n, x) in ops {
            match kind {
                0 => {
                    v.push(x);
                    model.push(x);
                }
                1 => v.reserve(n * 64),
                2 => v.reserve_exact(n),
                3 => {
                    let at = n % (model.len() + 1);
                    v.insert_n(at, n % 300, &x);
                    let tail = model.split_off(at);
                    model.extend(std::iter::repeat_n(x, n % 300));
                    model.extend(tail);
                }
                4 => {
                    v.shrink_to(n);
                }
                _ => {
                    v.resize_default(model.len() + n);
                    model.resize(model.len() + n, 0);
                }
            }
            prop_assert!(v.capacity() >= v.len());
            prop_assert_eq!(&v[..], &model[..]);
        }
    }
}
