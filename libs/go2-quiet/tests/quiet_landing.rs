//! Multi-step gait scenarios driven through the contact-sensor timers.

use approx::assert_relative_eq;
use go2_quiet::{
    AirTimeSource, ArticulationData, ContactSensorData, EnvState, FootDecelerationParams,
    FootDecelerationSwingPhase, Go2Config, RewardManager, RewardTerm, SceneSnapshot, TaskRegistry,
};
use nalgebra as na;

const DT: f32 = Go2Config::CONTROL_DT;

fn bodies() -> Vec<String> {
    ["base", "FL_thigh", "FL_foot", "FR_thigh", "FR_foot", "RL_foot", "RR_foot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn empty_scene(num_envs: usize) -> SceneSnapshot {
    SceneSnapshot::new(num_envs, DT)
        .with_sensor(Go2Config::CONTACT_SENSOR, ContactSensorData::new(num_envs, bodies()))
        .with_articulation(Go2Config::ROBOT, ArticulationData::new(num_envs, bodies()))
        .with_command(
            Go2Config::VELOCITY_COMMAND,
            na::DMatrix::from_fn(num_envs, 3, |_, j| if j == 0 { 1.0 } else { 0.0 }),
        )
}

/// Swing every foot for `swing_steps` and then land it, collecting the
/// quiet-landing reward of env 0 at each step.
fn swing_and_land(
    term: &mut FootDecelerationSwingPhase,
    swing_steps: usize,
    foot_speed: f32,
) -> Vec<f32> {
    let mut scene = empty_scene(1);
    let n = bodies().len();
    let air = na::DMatrix::from_element(1, n, false);
    let ground = na::DMatrix::from_element(1, n, true);

    let mut rewards = Vec::new();
    for step in 0..=swing_steps {
        let contact = if step < swing_steps { &air } else { &ground };
        scene
            .sensors
            .get_mut(Go2Config::CONTACT_SENSOR)
            .unwrap()
            .update(DT, contact)
            .unwrap();
        scene.articulations.get_mut(Go2Config::ROBOT).unwrap().body_lin_vel_w =
            na::DMatrix::from_element(1, n, na::Vector3::new(0.0, 0.0, -foot_speed));
        rewards.push(term.compute(&scene).unwrap()[0]);
    }
    rewards
}

fn quiet_term(source: AirTimeSource) -> FootDecelerationSwingPhase {
    let mut params = FootDecelerationParams {
        landing_air_time: source,
        ..FootDecelerationParams::quiet()
    };
    params.sensor_cfg.resolve(&bodies()).unwrap();
    FootDecelerationSwingPhase::new("foot_deceleration", params)
}

#[test]
fn late_swing_window_is_rewarded_per_foot() {
    let mut term = quiet_term(AirTimeSource::Current);
    let rewards = swing_and_land(&mut term, 12, 0.0);

    // air time after step k is (k + 1) * DT; the window is (0.05, 0.15]
    for (k, r) in rewards[..12].iter().enumerate() {
        let air = (k + 1) as f32 * DT;
        if air > 0.05 + 1e-4 && air < 0.15 - 1e-4 {
            assert_relative_eq!(*r, 4.0 * 0.3, epsilon = 1e-5);
        } else if air < 0.05 - 1e-4 || air > 0.15 + 1e-4 {
            assert_eq!(*r, 0.0, "air time {air}");
        }
    }
    // the running timer is reset on touchdown, so nothing is paid at landing
    assert_eq!(rewards[12], 0.0);
}

#[test]
fn completed_swing_pays_at_touchdown() {
    let mut term = quiet_term(AirTimeSource::LastSwing);
    let rewards = swing_and_land(&mut term, 12, 0.0);
    assert_relative_eq!(rewards[12], 4.0 * 0.7, epsilon = 1e-5);

    let mut short = quiet_term(AirTimeSource::LastSwing);
    let rewards = swing_and_land(&mut short, 1, 0.0);
    assert_eq!(rewards[1], 0.0);
}

#[test]
fn fast_feet_earn_less() {
    let slow: f32 = swing_and_land(&mut quiet_term(AirTimeSource::Current), 8, 0.05).iter().sum();
    let fast: f32 = swing_and_land(&mut quiet_term(AirTimeSource::Current), 8, 1.5).iter().sum();
    assert!(slow > fast);
    assert!(fast > 0.0);
}

#[test]
fn quiet_task_builds_a_manager() {
    let cfg = TaskRegistry::new().build("Acc-QuietVelocity-Rough-Unitree-Go2-v0").unwrap();
    let mut scene = empty_scene(3);
    scene.sensors.get_mut(Go2Config::CONTACT_SENSOR).unwrap().current_air_time =
        na::DMatrix::from_element(3, bodies().len(), 0.1);

    let mut manager = RewardManager::from_cfg(&cfg.rewards, &scene).unwrap();
    let mut names = manager.term_names();
    names.sort();
    assert_eq!(names, vec!["feet_air_time", "foot_deceleration"]);

    // no touchdowns, so only the quiet-landing term contributes
    let total = manager.compute(&scene).unwrap();
    assert_eq!(total.len(), scene.num_envs());
    for r in total.iter() {
        assert_relative_eq!(*r, 0.25 * 4.0 * 0.3 * DT, epsilon = 1e-6);
    }
    assert_relative_eq!(manager.step_reward("foot_deceleration").unwrap()[2], 1.2, epsilon = 1e-5);
}
