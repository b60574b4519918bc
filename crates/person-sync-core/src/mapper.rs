//! Field mapping between persisted and exposed shapes
//!
//! Mappers are pure and total: no I/O, no failure.

use crate::record::{Person, PersonDto, PersonPatch};

/// Conversion between an entity, its exposed shape, and its patch
pub trait EntityMapper: Send + Sync {
    type Entity;
    type Dto;
    type Patch;

    fn to_dto(&self, entity: &Self::Entity) -> Self::Dto;

    fn to_entity(&self, dto: &Self::Dto) -> Self::Entity;

    /// Overlay the present patch fields onto `entity`, retaining the rest
    fn partial_update(&self, entity: &mut Self::Entity, patch: &Self::Patch);

    fn to_dtos(&self, entities: &[Self::Entity]) -> Vec<Self::Dto> {
        entities.iter().map(|e| self.to_dto(e)).collect()
    }
}

/// Mapper for `Person`
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonMapper;

impl EntityMapper for PersonMapper {
    type Entity = Person;
    type Dto = PersonDto;
    type Patch = PersonPatch;

    fn to_dto(&self, entity: &Person) -> PersonDto {
        PersonDto {
            id: entity.id.clone(),
            first_name: entity.first_name.clone(),
            last_name: entity.last_name.clone(),
            telephone: entity.telephone,
        }
    }

    fn to_entity(&self, dto: &PersonDto) -> Person {
        Person {
            id: dto.id.clone(),
            first_name: dto.first_name.clone(),
            last_name: dto.last_name.clone(),
            telephone: dto.telephone,
        }
    }

    fn partial_update(&self, entity: &mut Person, patch: &PersonPatch) {
        if let Some(ref v) = patch.first_name {
            entity.first_name = v.clone();
        }
        if let Some(ref v) = patch.last_name {
            entity.last_name = v.clone();
        }
        if let Some(v) = patch.telephone {
            entity.telephone = v;
        }
    }
}
