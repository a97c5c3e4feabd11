//! Entity-component style usage of `SlotArray`.
//!
//! Each entity owns a fixed table of component slots, one per component kind. Components of
//! different concrete types share the table because they all implement `Component`. Systems
//! iterate the table and act on whichever components are present.

use dyn_slots::{SlotArray, element};
use new_zealand::nz;

trait Component {
    fn kind(&self) -> &'static str;
    fn tick(&mut self, dt: f32);
    fn describe(&self) -> String;
}

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone)]
struct Health {
    current: u32,
    regen_per_tick: u32,
    max: u32,
}

impl Component for Position {
    fn kind(&self) -> &'static str {
        "position"
    }

    fn tick(&mut self, _dt: f32) {}

    fn describe(&self) -> String {
        format!("at ({:.1}, {:.1})", self.x, self.y)
    }
}

impl Component for Velocity {
    fn kind(&self) -> &'static str {
        "velocity"
    }

    fn tick(&mut self, dt: f32) {
        // Drag.
        self.dx *= 1.0 - 0.1 * dt;
        self.dy *= 1.0 - 0.1 * dt;
    }

    fn describe(&self) -> String {
        format!("moving ({:.2}, {:.2})", self.dx, self.dy)
    }
}

impl Component for Health {
    fn kind(&self) -> &'static str {
        "health"
    }

    fn tick(&mut self, _dt: f32) {
        self.current = self
            .current
            .saturating_add(self.regen_per_tick)
            .min(self.max);
    }

    fn describe(&self) -> String {
        format!("{}/{} hp", self.current, self.max)
    }
}

element!(Position => dyn Component, copy);
element!(Velocity => dyn Component, copy);
element!(Health => dyn Component, clone);

const POSITION: usize = 0;
const VELOCITY: usize = 1;
const HEALTH: usize = 2;

fn new_entity() -> SlotArray<dyn Component> {
    SlotArray::builder()
        .capacity(nz!(3))
        .fits::<Position>()
        .fits::<Velocity>()
        .fits::<Health>()
        .build()
}

fn print_entity(name: &str, entity: &SlotArray<dyn Component>) {
    println!("{name}:");

    for component in entity.iter().flatten() {
        println!("  {}: {}", component.kind(), component.describe());
    }
}

fn main() -> Result<(), dyn_slots::Error> {
    let mut player = new_entity();
    player.emplace(POSITION, Position { x: 0.0, y: 0.0 })?;
    player.emplace(VELOCITY, Velocity { dx: 1.0, dy: 0.5 })?;
    player.emplace(
        HEALTH,
        Health {
            current: 50,
            regen_per_tick: 5,
            max: 100,
        },
    )?;

    let mut rock = new_entity();
    rock.emplace(POSITION, Position { x: 10.0, y: -2.0 })?;

    print_entity("player", &player);
    print_entity("rock", &rock);

    for _ in 0..3 {
        for entity in [&mut player, &mut rock] {
            // Generic system: every present component ticks.
            for component in entity.iter_mut().flatten() {
                component.tick(1.0);
            }
        }
    }

    print_entity("player after 3 ticks", &player);

    // Entities whose components can all be copied can be cloned as a whole.
    if player.is_copyable() {
        let mut clone = player.try_clone()?;
        clone.emplace(POSITION, Position { x: 5.0, y: 5.0 })?;
        print_entity("player clone", &clone);
    }

    // Removing a component kind is done by clearing and rebuilding the table.
    rock.clear();
    println!(
        "rock has {} components after clear",
        rock.iter().flatten().count()
    );

    Ok(())
}
