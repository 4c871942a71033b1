//! Drops a fractured wall onto a ground plane using the in-process reference
//! backend and prints how the shard constraints fare.
//!
//! Run with `RUST_LOG=debug` to watch the validation and breaking passes.

use anyhow::Result;
use glam::{Mat4, Vec3};

use shardsim::constraint::RigidBodyConstraint;
use shardsim::scene::{FractureState, Island};
use shardsim::{
    step_frame, BodyKey, BodyType, CollisionShape, ConstraintType, IslandId, MockBackend, Mesh,
    ObjectId, RigidBody, RigidBodyWorld, Scene, SceneObject,
};

fn box_mesh(center: Vec3, half: Vec3) -> Mesh {
    Mesh {
        vertices: vec![center - half, center + half],
        triangles: vec![],
    }
}

fn shard(center: Vec3) -> Island {
    let half = Vec3::splat(0.5);
    let mut island = Island::new(center, vec![center - half, center + half]);
    island.body.shape = CollisionShape::Box;
    island.body.position = center + Vec3::new(0.0, 0.0, 4.0);
    island
}

fn main() -> Result<()> {
    env_logger::init();

    let mut scene = Scene::new();

    let mut ground = SceneObject::new("ground", box_mesh(Vec3::ZERO, Vec3::new(10.0, 10.0, 0.5)));
    let mut ground_body = RigidBody::new(BodyType::Passive);
    ground_body.shape = CollisionShape::Box;
    ground.body = Some(ground_body);
    ground.transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -0.5));
    let ground_id = scene.add_object(ground);

    // a three-shard column starting four units above the ground
    let mut wall = SceneObject::new("wall", box_mesh(Vec3::new(0.0, 0.0, 1.5), Vec3::new(0.5, 0.5, 1.5)));
    wall.transform = Mat4::from_translation(Vec3::new(0.0, 0.0, 4.0));
    let centers = [0.5, 1.5, 2.5].map(|z| Vec3::new(0.0, 0.0, z));
    let mut fracture = FractureState::new(centers.iter().map(|c| shard(*c)).collect());
    let wall_ref = ObjectId(1);
    for i in 0u32..2 {
        fracture.constraints.push(RigidBodyConstraint::new_shard(
            ConstraintType::Fixed,
            BodyKey::island(wall_ref, IslandId(i)),
            BodyKey::island(wall_ref, IslandId(i + 1)),
        ));
    }
    fracture.settings.breaking_distance = 0.2;
    fracture.settings.breaking_percentage = 50;
    fracture.relink_participating_constraints();
    wall.fracture = Some(fracture);
    let wall_id = scene.add_object(wall);

    let mut world = RigidBodyWorld::new(
        Box::new(MockBackend::new()),
        scene.frame_start,
        scene.frame_end,
    );
    world.add_member(ground_id);
    world.add_member(wall_id);

    for frame in 1..=72 {
        step_frame(&mut scene, &mut world, frame)?;
        if frame % 12 == 0 {
            let fracture = scene.objects[wall_id.0 as usize]
                .fracture
                .as_ref()
                .expect("wall is fractured");
            let intact = fracture.constraints.iter().filter(|c| c.is_enabled()).count();
            let lowest = fracture
                .islands
                .iter()
                .map(|i| i.body.position.z)
                .fold(f32::MAX, f32::min);
            println!(
                "frame {:3}: {} of {} constraints intact, lowest shard at z = {:.2}",
                frame,
                intact,
                fracture.constraints.len(),
                lowest
            );
        }
    }
    Ok(())
}
