// The polymer batcher stacks PolymerItems into one batch. Every item of a dataset already
// carries one sequence per entity padded to that entity's fixed length, so each entity
// becomes a [batch_size, length] token tensor with a matching padding mask, and the
// labels become a [batch_size, num_labels] float tensor.

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Shape, Tensor},
};
use derive_new::new;

use super::dataset::PolymerItem;

/// Batcher for polymer dataset items
#[derive(new)]
pub struct PolymerBatcher<B: Backend> {
    padding_index: usize, // Padding index of the tokenizer that produced the items
    device: B::Device,    // Device the tensors are created on
}

/// Batch of polymer samples
#[derive(Debug, Clone, new)]
pub struct PolymerBatch<B: Backend> {
    pub entities: Vec<Tensor<B, 2, Int>>,   // Token indices per entity
    pub masks_pad: Vec<Tensor<B, 2, Bool>>, // Padding mask per entity, true on padding
    pub labels: Tensor<B, 2>,               // Label values
}

impl<B: Backend> Batcher<PolymerItem, PolymerBatch<B>> for PolymerBatcher<B> {
    fn batch(&self, items: Vec<PolymerItem>) -> PolymerBatch<B> {
        let batch_size = items.len();
        let num_entities = items.first().map_or(0, |item| item.entities.len());
        let num_labels = items.first().map_or(0, |item| item.labels.len());

        let mut entities = Vec::with_capacity(num_entities);
        let mut masks_pad = Vec::with_capacity(num_entities);

        for entity in 0..num_entities {
            let length = items[0].entities[entity].len();
            let values: Vec<B::IntElem> = items
                .iter()
                .flat_map(|item| item.entities[entity].iter().map(|&t| (t as i64).elem()))
                .collect();
            let tokens = Tensor::<B, 2, Int>::from_data(
                Data::new(values, Shape::new([batch_size, length])),
                &self.device,
            );

            masks_pad.push(tokens.clone().equal_elem(self.padding_index as i64));
            entities.push(tokens);
        }

        let values: Vec<B::FloatElem> = items
            .iter()
            .flat_map(|item| item.labels.iter().map(|&v| v.elem()))
            .collect();
        let labels = Tensor::<B, 2>::from_data(
            Data::new(values, Shape::new([batch_size, num_labels])),
            &self.device,
        );

        PolymerBatch {
            entities,
            masks_pad,
            labels,
        }
    }
}
