use pickservo_kernel::safety::{
    self, ARM_X_CM, ARM_Y_CM, ARM_Z_CM, BASE_ANGULAR_RATE_DEG_S, BASE_DURATION_S,
    BASE_VELOCITY_MM_S, Bounds,
};
use pickservo_types::{ArmPose, BaseCommand};
use proptest::prelude::*;

const CLAMPS: [(fn(f64) -> f64, Bounds); 6] = [
    (safety::clamp_velocity, BASE_VELOCITY_MM_S),
    (safety::clamp_angular_rate, BASE_ANGULAR_RATE_DEG_S),
    (safety::clamp_duration, BASE_DURATION_S),
    (safety::clamp_arm_x, ARM_X_CM),
    (safety::clamp_arm_y, ARM_Y_CM),
    (safety::clamp_arm_z, ARM_Z_CM),
];

proptest! {
    #[test]
    fn clamp_lands_in_range(x in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        for (clamp, bounds) in CLAMPS {
            let c = clamp(x);
            prop_assert!(c >= bounds.min && c <= bounds.max);
        }
    }

    #[test]
    fn clamp_is_idempotent(x in -1.0e6f64..1.0e6) {
        for (clamp, _) in CLAMPS {
            prop_assert_eq!(clamp(clamp(x)), clamp(x));
        }
    }

    #[test]
    fn infinities_saturate(sign in prop::bool::ANY) {
        let x = if sign { f64::INFINITY } else { f64::NEG_INFINITY };
        for (clamp, bounds) in CLAMPS {
            let c = clamp(x);
            prop_assert!(c == bounds.min || c == bounds.max);
        }
    }

    #[test]
    fn integer_clamps_are_idempotent(speed in any::<u32>(), position in any::<i32>()) {
        let s = safety::clamp_arm_speed(speed);
        prop_assert!((500..=3000).contains(&s));
        prop_assert_eq!(safety::clamp_arm_speed(s), s);

        let p = safety::clamp_gripper_position(position);
        prop_assert!(p <= 100);
        prop_assert_eq!(safety::clamp_gripper_position(i32::from(p)), p);
    }

    #[test]
    fn clamped_base_command_validates(
        velocity in -1.0e4f64..1.0e4,
        direction in 0.0f64..360.0,
        angular_rate in -1.0e3f64..1.0e3,
        duration in -10.0f64..10.0,
    ) {
        let cmd = safety::clamp_base(BaseCommand { velocity, direction, angular_rate, duration });
        prop_assert!(safety::validate_base(&cmd).is_ok());
    }

    #[test]
    fn clamped_arm_pose_validates(
        x in -100.0f64..100.0,
        y in -100.0f64..100.0,
        z in -100.0f64..100.0,
        speed in any::<u32>(),
    ) {
        let pose = safety::clamp_arm(ArmPose { speed, ..ArmPose::at(x, y, z) });
        prop_assert!(safety::validate_arm(&pose).is_ok());
    }

    #[test]
    fn in_range_values_are_never_rejected(
        velocity in 0.0f64..=200.0,
        angular_rate in -50.0f64..=50.0,
        duration in 0.2f64..=0.5,
        direction in 0.0f64..360.0,
    ) {
        let cmd = BaseCommand { velocity, direction, angular_rate, duration };
        prop_assert_eq!(safety::clamp_base(cmd), cmd);
        prop_assert!(safety::validate_base(&safety::clamp_base(cmd)).is_ok());
    }
}
