//! Single-pass weighted selection shared by every slot type.

use rand::Rng;

/// Pick one entry with probability proportional to its weight.
///
/// Reservoir style: each candidate replaces the current choice with chance
/// `weight / running_total`, so the list is walked once. Zero weights never win.
pub fn pick_weighted<'a, T, R>(items: impl IntoIterator<Item = &'a T>, weight: impl Fn(&T) -> u32, rng: &mut R) -> Option<&'a T>
where
    T: 'a,
    R: Rng + ?Sized,
{
    let mut total: u64 = 0;
    let mut chosen = None;
    for item in items {
        let w = u64::from(weight(item));
        if w == 0 {
            continue;
        }
        total += w;
        if rng.random_range(0..total) < w {
            chosen = Some(item);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_weights_never_win() {
        let mut rng = StdRng::seed_from_u64(7);
        let items = [("a", 0), ("b", 5), ("c", 0)];
        for _ in 0..50 {
            let picked = pick_weighted(&items, |i| i.1, &mut rng).unwrap();
            assert_eq!(picked.0, "b");
        }
    }

    #[test]
    fn empty_or_all_zero_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let none: [(char, u32); 0] = [];
        assert!(pick_weighted(&none, |i| i.1, &mut rng).is_none());
        assert!(pick_weighted(&[('x', 0)], |i| i.1, &mut rng).is_none());
    }

    #[test]
    fn weights_shape_the_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let items = [('a', 1), ('b', 9)];
        let mut b = 0;
        for _ in 0..2000 {
            if pick_weighted(&items, |i| i.1, &mut rng).unwrap().0 == 'b' {
                b += 1;
            }
        }
        assert!((1600..=1990).contains(&b), "b picked {b} times");
    }
}
