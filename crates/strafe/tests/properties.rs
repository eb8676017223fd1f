use proptest::prelude::*;

use strafe::data::{
    DecimalQuantization, SizeQuantization, quantize_angle, quantize_decimal, quantize_unit,
};
use strafe::{EntityId, Move, MoveInput, MoveQueue, Pose, QuantizeConfig, RecipientRole, State,
    StateQueue};

fn decimal_levels() -> impl Strategy<Value = DecimalQuantization> {
    prop_oneof![
        Just(DecimalQuantization::RoundWholeNumber),
        Just(DecimalQuantization::RoundOneDecimal),
        Just(DecimalQuantization::RoundTwoDecimals),
        Just(DecimalQuantization::None),
    ]
}

fn size_levels() -> impl Strategy<Value = SizeQuantization> {
    prop_oneof![
        Just(SizeQuantization::Byte),
        Just(SizeQuantization::Short),
        Just(SizeQuantization::None),
    ]
}

proptest! {
    #[test]
    fn decimal_quantization_idempotent(
        value in -100_000.0f32..100_000.0,
        level in decimal_levels(),
    ) {
        let once = quantize_decimal(value, level);
        let twice = quantize_decimal(once, level);
        prop_assert_eq!(once.to_bits(), twice.to_bits());
    }

    #[test]
    fn angle_quantization_idempotent(
        angle in -720.0f32..720.0,
        level in size_levels(),
    ) {
        let once = quantize_angle(angle, level);
        let twice = quantize_angle(once, level);
        prop_assert!((once - twice).abs() < 1e-4);
        prop_assert!((-180.0..180.0 + 1e-3).contains(&once));
    }

    #[test]
    fn unit_quantization_idempotent_and_clamped(
        value in -2.0f32..2.0,
        level in size_levels(),
    ) {
        let once = quantize_unit(value, level);
        let twice = quantize_unit(once, level);
        prop_assert!((once - twice).abs() < 1e-6);
        prop_assert!((-1.0..=1.0).contains(&once));
    }

    #[test]
    fn move_queue_monotonic_and_bounded(
        timestamps in prop::collection::vec(0.0f32..100.0, 1..200),
        max_size in 1usize..32,
    ) {
        let mut queue = MoveQueue::new(max_size);
        for timestamp in timestamps {
            queue.push(Move::new(timestamp, 0.01, MoveInput::default()));
            prop_assert!(queue.len() <= max_size);
        }
        let order: Vec<f32> = queue.iter().map(|m| m.timestamp).collect();
        prop_assert!(order.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn state_queue_strictly_increasing_and_bounded(
        timestamps in prop::collection::vec(0.0f32..100.0, 1..200),
        max_size in 2usize..32,
    ) {
        let mut queue = StateQueue::new(max_size);
        for timestamp in timestamps {
            queue.push(State::new(
                timestamp,
                EntityId(1),
                RecipientRole::SimulatedProxy,
                Pose::default(),
                QuantizeConfig::default(),
            ));
            prop_assert!(queue.len() <= max_size);
        }
        let order: Vec<f32> = queue.iter().map(|s| s.timestamp).collect();
        prop_assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn bracket_encloses_search_time(
        offsets in prop::collection::vec(0.001f32..0.5, 2..32),
        fraction in 0.0f32..1.0,
    ) {
        let mut queue = StateQueue::new(64);
        let mut timestamp = 0.0;
        for offset in &offsets {
            timestamp += offset;
            queue.push(State::new(
                timestamp,
                EntityId(1),
                RecipientRole::SimulatedProxy,
                Pose::default(),
                QuantizeConfig::default(),
            ));
        }
        let oldest = queue.oldest().unwrap().timestamp;
        let newest = queue.newest().unwrap().timestamp;
        let time = oldest + (newest - oldest) * fraction;

        if let Some((start, target)) = queue.bracket(time) {
            prop_assert_eq!(target, start + 1);
            prop_assert!(queue.get(start).unwrap().timestamp <= time);
            prop_assert!(queue.get(target).unwrap().timestamp >= time);
        } else {
            // Only permissible when the time falls outside the span.
            prop_assert!(time < oldest || time > newest);
        }
    }
}
