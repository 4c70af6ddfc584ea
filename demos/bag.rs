//! Mutation harness for a tiny multiset.
//!
//! ```text
//! cargo run --example bag -- --mode test
//! cargo run --example bag -- --mode mutate --tests demos/bag.rs
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::{Arc, LazyLock};

use kitchensink_mutation::cli;
use kitchensink_mutation::prelude::*;

type AddFn = dyn Fn(&mut Bag, &str) + Send + Sync;

static ADD: LazyLock<Arc<FunctionSlot<AddFn>>> = LazyLock::new(|| {
    let original: Arc<AddFn> = Arc::new(|bag: &mut Bag, item: &str| {
        *bag.counts.entry(item.to_string()).or_insert(0) += 1;
    });
    FunctionSlot::new("Bag.add", original)
});

#[derive(Debug, Default)]
struct Bag {
    counts: BTreeMap<String, usize>,
}

impl Bag {
    fn add(&mut self, item: &str) {
        (ADD.current())(self, item)
    }

    fn size(&self) -> usize {
        self.counts.values().sum()
    }

    fn count(&self, item: &str) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    fn contains(&self, item: &str) -> bool {
        choose(
            "Bag.contains",
            || self.count(item) > 0,
            || self.count(item) > 1,
        )
    }
}

fn registry() -> MutationRegistry {
    let mut registry = MutationRegistry::new();
    registry
        .declare_function(&*ADD)
        .expect("Bag.add is declared once");

    let update_nothing: Arc<AddFn> = Arc::new(|_bag: &mut Bag, _item: &str| {});
    registry
        .register_whole_function("Bag.add", "UPDATE_NOTHING", update_nothing)
        .expect("UPDATE_NOTHING is registered once");
    let insert_twice: Arc<AddFn> = Arc::new(|bag: &mut Bag, item: &str| {
        *bag.counts.entry(item.to_string()).or_insert(0) += 2;
    });
    registry
        .register_whole_function("Bag.add", "INSERT_TWICE", insert_twice)
        .expect("INSERT_TWICE is registered once");
    registry
        .register_inline("Bag.contains", "NEEDS_TWO", || true, || false)
        .expect("NEEDS_TWO is registered once");
    registry
}

fn suite() -> InProcessSuite {
    InProcessSuite::new()
        .test("demos/bag.rs", "test_add_increases_size", || {
            let mut bag = Bag::default();
            bag.add("apple");
            assert_eq!(bag.size(), 1);
        })
        .test("demos/bag.rs", "test_add_then_contains", || {
            let mut bag = Bag::default();
            bag.add("pear");
            assert!(bag.contains("pear"));
        })
        .test("demos/bag.rs", "test_count_matches_adds", || {
            proptest!(|(n in 1_usize..20)| {
                let mut bag = Bag::default();
                for _ in 0..n {
                    bag.add("plum");
                }
                prop_assert_eq!(bag.count("plum"), n);
            });
        })
}

fn main() -> ExitCode {
    cli::main_with(registry(), suite())
}
